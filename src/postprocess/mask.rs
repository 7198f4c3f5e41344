// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/postprocess/mask.rs - 实例掩膜解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{GrayImage, ImageBuffer, Luma, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use tracing::debug;

use crate::postprocess::decode::scale_box;
use crate::postprocess::{Point, Rect, polygon_area, sigmoid};
use crate::tensor::{TensorError, TensorView};

/// 分割检测头逐锚点特征数：4 个框坐标 + 1 个物体置信度 + 32 个掩膜系数。
pub const SEG_FEATURES: usize = 37;
/// 分割检测头锚点数。
pub const SEG_ANCHORS: usize = 8400;
/// 掩膜原型通道数。
pub const MASK_CHANNELS: usize = 32;

/// 掩膜去重之前的分割候选。
#[derive(Debug, Clone)]
pub struct SegCandidate {
  pub bbox: Rect,
  pub score: f32,
  pub coeffs: [f32; MASK_CHANNELS],
}

/// 解码 `[1, 37, 8400]` 分割检测头张量。
///
/// 物体置信度低于阈值的锚点丢弃；框解码与检测模式一致，退化框丢弃。
/// 掩膜系数原样保留，重建推迟到 NMS 之后。
pub fn decode_seg_candidates(
  output: &TensorView<'_>,
  input_size: (u32, u32),
  orig_size: (u32, u32),
  conf_threshold: f32,
) -> Result<Vec<SegCandidate>, TensorError> {
  output.expect_shape(&[Some(1), Some(SEG_FEATURES), Some(SEG_ANCHORS)])?;

  let data = output.data();
  let scale_x = orig_size.0 as f32 / input_size.0 as f32;
  let scale_y = orig_size.1 as f32 / input_size.1 as f32;

  let mut candidates = Vec::new();

  for i in 0..SEG_ANCHORS {
    let objectness = data[4 * SEG_ANCHORS + i];
    if objectness < conf_threshold {
      continue;
    }

    let cx = data[i];
    let cy = data[SEG_ANCHORS + i];
    let w = data[2 * SEG_ANCHORS + i];
    let h = data[3 * SEG_ANCHORS + i];

    let Some(bbox) = scale_box(cx, cy, w, h, scale_x, scale_y, orig_size) else {
      continue;
    };

    let mut coeffs = [0.0f32; MASK_CHANNELS];
    for (c, coeff) in coeffs.iter_mut().enumerate() {
      *coeff = data[(5 + c) * SEG_ANCHORS + i];
    }

    candidates.push(SegCandidate {
      bbox,
      score: objectness,
      coeffs,
    });
  }

  debug!("分割解码得到 {} 个候选", candidates.len());
  Ok(candidates)
}

/// 校验后的掩膜原型视图：`[1, 32, P, P]`，P 从张量读出。
#[derive(Debug, Clone, Copy)]
pub struct ProtoView<'a> {
  data: &'a [f32],
  height: usize,
  width: usize,
}

pub fn proto_view<'a>(view: &TensorView<'a>) -> Result<ProtoView<'a>, TensorError> {
  view.expect_shape(&[Some(1), Some(MASK_CHANNELS), None, None])?;

  Ok(ProtoView {
    data: view.data(),
    height: view.dim(2),
    width: view.dim(3),
  })
}

/// 用掩膜系数与原型重建单个实例的边界多边形。
///
/// 逐像素求 32 通道加权和并过 sigmoid 得到 P×P 软掩膜，双线性放大到
/// 原图分辨率后以 0.5 二值化；取面积最大的外轮廓，按周长比例容差做
/// Douglas-Peucker 简化。没有轮廓或简化后不足 3 个独立点时返回 `None`，
/// 属于正常结果而不是错误。
pub fn extract_polygon(
  coeffs: &[f32; MASK_CHANNELS],
  proto: &ProtoView<'_>,
  orig_size: (u32, u32),
  simplify_tolerance: f32,
) -> Option<Vec<Point<i32>>> {
  let plane = proto.height * proto.width;
  let mut soft = Vec::with_capacity(plane);

  for y in 0..proto.height {
    for x in 0..proto.width {
      let mut sum = 0.0f32;
      for (c, coeff) in coeffs.iter().enumerate() {
        sum += coeff * proto.data[c * plane + y * proto.width + x];
      }
      soft.push(sigmoid(sum));
    }
  }

  let soft: ImageBuffer<Luma<f32>, Vec<f32>> =
    ImageBuffer::from_raw(proto.width as u32, proto.height as u32, soft)?;

  let full = imageops::resize(
    &soft,
    orig_size.0,
    orig_size.1,
    imageops::FilterType::Triangle,
  );

  let binary = GrayImage::from_fn(orig_size.0, orig_size.1, |x, y| {
    if full.get_pixel(x, y)[0] > 0.5 {
      Luma([255u8])
    } else {
      Luma([0u8])
    }
  });

  let contour = largest_outer_contour(&binary)?;
  simplify_contour(&contour, simplify_tolerance)
}

/// 面积最大的外轮廓。面积相同时保留先遇到的那个。
fn largest_outer_contour(binary: &GrayImage) -> Option<Vec<Point<i32>>> {
  let mut best: Option<(f64, Vec<Point<i32>>)> = None;

  for contour in find_contours::<i32>(binary) {
    if contour.border_type != BorderType::Outer {
      continue;
    }
    let area = polygon_area(&contour.points);
    if best.as_ref().is_none_or(|(max_area, _)| area > *max_area) {
      best = Some((area, contour.points));
    }
  }

  best.map(|(_, points)| points)
}

/// 按 `epsilon = tolerance × 闭合周长` 简化轮廓，去掉重复点后
/// 不足 3 个点的多边形丢弃。
fn simplify_contour(contour: &[Point<i32>], tolerance: f32) -> Option<Vec<Point<i32>>> {
  let perimeter = arc_length(contour, true);
  if perimeter <= 0.0 {
    return None;
  }

  // approximate_polygon_dp 对非正 epsilon 会 panic，容差为 0 时跳过简化
  let epsilon = tolerance as f64 * perimeter;
  let mut simplified = if epsilon > 0.0 {
    approximate_polygon_dp(contour, epsilon, true)
  } else {
    contour.to_vec()
  };

  simplified.dedup();
  if simplified.len() > 1 && simplified.first() == simplified.last() {
    simplified.pop();
  }

  if simplified.len() >= 3 {
    Some(simplified)
  } else {
    None
  }
}
