// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/postprocess/decode.rs - 检测头解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::postprocess::Rect;
use crate::tensor::{TensorError, TensorView};

/// NMS 之前的候选框。
#[derive(Debug, Clone)]
pub struct Candidate {
  pub bbox: Rect,
  pub score: f32,
  pub class_id: usize,
}

/// 解码 `[1, 4+K, N]` 检测头张量。
///
/// 张量按“特征为主、锚点为辅”排布（`feature*N + anchor`），逐锚点做逻辑
/// 转置：取类别得分最大者，低于置信度阈值的锚点丢弃；中心框转角点框，
/// 按原图比例缩放、取整并截断到图像边界，退化框丢弃。
pub fn decode_detections(
  output: &TensorView<'_>,
  input_size: (u32, u32),
  orig_size: (u32, u32),
  conf_threshold: f32,
) -> Result<Vec<Candidate>, TensorError> {
  output.expect_shape(&[Some(1), None, None])?;

  let features = output.dim(1);
  let anchors = output.dim(2);
  if features < 5 {
    return Err(TensorError::ShapeMismatch {
      expected: "[1, 4+K, N] (K >= 1)".to_string(),
      actual: output.shape().to_vec(),
    });
  }
  let num_classes = features - 4;

  let data = output.data();
  let scale_x = orig_size.0 as f32 / input_size.0 as f32;
  let scale_y = orig_size.1 as f32 / input_size.1 as f32;

  let mut candidates = Vec::new();

  for i in 0..anchors {
    let (score, class_id) = {
      let mut max_prob = 0.0f32;
      let mut max_class = 0usize;
      for c in 0..num_classes {
        let prob = data[(4 + c) * anchors + i];
        if prob > max_prob {
          max_prob = prob;
          max_class = c;
        }
      }
      (max_prob, max_class)
    };

    if score < conf_threshold {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];

    let Some(bbox) = scale_box(cx, cy, w, h, scale_x, scale_y, orig_size) else {
      continue;
    };

    candidates.push(Candidate {
      bbox,
      score,
      class_id,
    });
  }

  debug!("解码得到 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 中心框转角点、缩放到原图、取整并截断。退化框返回 `None`。
pub(crate) fn scale_box(
  cx: f32,
  cy: f32,
  w: f32,
  h: f32,
  scale_x: f32,
  scale_y: f32,
  orig_size: (u32, u32),
) -> Option<Rect> {
  let x0 = ((cx - w / 2.0) * scale_x) as i32;
  let y0 = ((cy - h / 2.0) * scale_y) as i32;
  let x1 = ((cx + w / 2.0) * scale_x) as i32;
  let y1 = ((cy + h / 2.0) * scale_y) as i32;

  let x0 = x0.clamp(0, orig_size.0 as i32);
  let y0 = y0.clamp(0, orig_size.1 as i32);
  let x1 = x1.clamp(0, orig_size.0 as i32);
  let y1 = y1.clamp(0, orig_size.1 as i32);

  if x1 <= x0 || y1 <= y0 {
    return None;
  }

  Some(Rect::new(x0, y0, x1, y1))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::Tensor;

  /// 按 `feature*N + anchor` 排布构造检测头张量。
  fn head_tensor(rows: &[&[f32]]) -> Tensor {
    let features = rows.len();
    let anchors = rows[0].len();
    let mut data = Vec::with_capacity(features * anchors);
    for row in rows {
      data.extend_from_slice(row);
    }
    Tensor::new(data, vec![1, features, anchors]).unwrap()
  }

  #[test]
  fn single_anchor_round_trip() {
    // K=2, N=3。仅锚点 1 的 class-1 得分 0.9 超过阈值。
    let tensor = head_tensor(&[
      &[0.0, 320.0, 0.0],
      &[0.0, 320.0, 0.0],
      &[0.0, 64.0, 0.0],
      &[0.0, 64.0, 0.0],
      &[0.1, 0.2, 0.1],
      &[0.1, 0.9, 0.1],
    ]);

    let candidates =
      decode_detections(&tensor.view(), (640, 640), (1280, 960), 0.5).unwrap();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.class_id, 1);
    assert!((c.score - 0.9).abs() < 1e-6);
    // scaleX=2, scaleY=1.5
    assert!((c.bbox.x0 - 576).abs() <= 1);
    assert!((c.bbox.y0 - 432).abs() <= 1);
    assert!((c.bbox.x1 - 704).abs() <= 1);
    assert!((c.bbox.y1 - 528).abs() <= 1);
  }

  #[test]
  fn boxes_satisfy_image_invariants() {
    // 越界的大框必须被截断到 [0, orig]
    let tensor = head_tensor(&[
      &[10.0, 630.0],
      &[10.0, 630.0],
      &[100.0, 100.0],
      &[100.0, 100.0],
      &[0.9, 0.9],
    ]);

    let candidates =
      decode_detections(&tensor.view(), (640, 640), (320, 240), 0.5).unwrap();

    assert_eq!(candidates.len(), 2);
    for c in &candidates {
      assert!(0 <= c.bbox.x0 && c.bbox.x0 < c.bbox.x1 && c.bbox.x1 <= 320);
      assert!(0 <= c.bbox.y0 && c.bbox.y0 < c.bbox.y1 && c.bbox.y1 <= 240);
    }
  }

  #[test]
  fn degenerate_boxes_are_dropped() {
    let tensor = head_tensor(&[&[320.0], &[320.0], &[0.0], &[64.0], &[0.9]]);
    let candidates =
      decode_detections(&tensor.view(), (640, 640), (640, 640), 0.5).unwrap();
    assert!(candidates.is_empty());
  }

  #[test]
  fn below_threshold_yields_empty() {
    let tensor = head_tensor(&[&[320.0], &[320.0], &[64.0], &[64.0], &[0.3]]);
    let candidates =
      decode_detections(&tensor.view(), (640, 640), (640, 640), 0.5).unwrap();
    assert!(candidates.is_empty());
  }

  #[test]
  fn shape_mismatch_is_an_error() {
    // 秩不是 3
    let t = Tensor::new(vec![0.0; 10], vec![2, 5]).unwrap();
    assert!(matches!(
      decode_detections(&t.view(), (640, 640), (640, 640), 0.5),
      Err(TensorError::ShapeMismatch { .. })
    ));

    // 批大小不是 1
    let t = Tensor::new(vec![0.0; 20], vec![2, 5, 2]).unwrap();
    assert!(matches!(
      decode_detections(&t.view(), (640, 640), (640, 640), 0.5),
      Err(TensorError::ShapeMismatch { .. })
    ));

    // 特征数不足 4+K
    let t = Tensor::new(vec![0.0; 8], vec![1, 4, 2]).unwrap();
    assert!(matches!(
      decode_detections(&t.view(), (640, 640), (640, 640), 0.5),
      Err(TensorError::ShapeMismatch { .. })
    ));
  }
}
