// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/postprocess/nms.rs - 候选框非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cmp::Ordering;

use crate::postprocess::Rect;

/// 贪心类无关 NMS。
///
/// 按置信度降序遍历（稳定排序，同分保持候选顺序），与所有已保留框的
/// IoU 均不超过阈值的候选才被保留。返回保留下标，置信度降序。
/// 空输入返回空结果。
pub fn nms_indices(boxes: &[Rect], confidences: &[f32], iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..boxes.len()).collect();
  order.sort_by(|&a, &b| {
    confidences[b]
      .partial_cmp(&confidences[a])
      .unwrap_or(Ordering::Equal)
  });

  let mut keep: Vec<usize> = Vec::new();

  for &i in &order {
    let suppressed = keep
      .iter()
      .any(|&j| boxes[i].iou(&boxes[j]) > iou_threshold);
    if !suppressed {
      keep.push(i);
    }
  }

  keep
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_input_is_not_an_error() {
    assert!(nms_indices(&[], &[], 0.45).is_empty());
  }

  #[test]
  fn overlapping_pair_keeps_higher_confidence() {
    let boxes = [Rect::new(0, 0, 100, 100), Rect::new(5, 5, 105, 105)];
    let confidences = [0.6, 0.9];

    let keep = nms_indices(&boxes, &confidences, 0.45);
    assert_eq!(keep, vec![1]);
  }

  #[test]
  fn low_overlap_pair_both_survive() {
    let boxes = [Rect::new(0, 0, 100, 100), Rect::new(90, 90, 190, 190)];
    let confidences = [0.9, 0.6];

    let keep = nms_indices(&boxes, &confidences, 0.45);
    assert_eq!(keep, vec![0, 1]);
  }

  #[test]
  fn output_is_confidence_descending() {
    let boxes = [
      Rect::new(0, 0, 10, 10),
      Rect::new(100, 100, 110, 110),
      Rect::new(200, 200, 210, 210),
    ];
    let confidences = [0.5, 0.9, 0.7];

    let keep = nms_indices(&boxes, &confidences, 0.45);
    assert_eq!(keep, vec![1, 2, 0]);
  }

  #[test]
  fn suppression_is_idempotent() {
    let boxes = [
      Rect::new(0, 0, 100, 100),
      Rect::new(2, 2, 102, 102),
      Rect::new(300, 0, 400, 100),
      Rect::new(305, 0, 405, 100),
    ];
    let confidences = [0.9, 0.8, 0.7, 0.95];

    let keep = nms_indices(&boxes, &confidences, 0.45);

    let boxes2: Vec<Rect> = keep.iter().map(|&i| boxes[i]).collect();
    let confidences2: Vec<f32> = keep.iter().map(|&i| confidences[i]).collect();
    let keep2 = nms_indices(&boxes2, &confidences2, 0.45);

    let resolved: Vec<usize> = keep2.iter().map(|&i| keep[i]).collect();
    assert_eq!(resolved, keep);
  }

  #[test]
  fn equal_confidence_keeps_candidate_order() {
    let boxes = [Rect::new(0, 0, 10, 10), Rect::new(1, 1, 11, 11)];
    let confidences = [0.8, 0.8];

    let keep = nms_indices(&boxes, &confidences, 0.45);
    assert_eq!(keep, vec![0]);
  }
}
