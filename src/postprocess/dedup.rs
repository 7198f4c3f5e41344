// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/postprocess/dedup.rs - 实例掩膜去重
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cmp::Ordering;

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use tracing::debug;

use crate::model::SegDetection;
use crate::postprocess::{Point, points_bounding_box};

/// 贪心掩膜去重：按分数降序遍历，与任一已保留掩膜的像素级 IoU
/// 严格大于阈值的实例被抑制。返回结果保持分数降序。
pub fn filter_duplicate_masks(mut dets: Vec<SegDetection>, threshold: f32) -> Vec<SegDetection> {
  dets.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut keep: Vec<SegDetection> = Vec::new();

  for det in dets {
    let duplicate = keep
      .iter()
      .any(|kept| mask_iou(&kept.polygon, &det.polygon) > threshold);
    if duplicate {
      debug!("抑制重复掩膜 (score={})", det.score);
    } else {
      keep.push(det);
    }
  }

  keep
}

/// 两个多边形掩膜的像素级 IoU。
///
/// 在两者的联合外接范围内分别栅格化填充，交集取按位与，并集取按位或。
/// 任一多边形为空或并集为空时返回 0。
pub(crate) fn mask_iou(a: &[Point<i32>], b: &[Point<i32>]) -> f32 {
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }

  let joint: Vec<Point<i32>> = a.iter().chain(b.iter()).copied().collect();
  let Some((min_x, min_y, max_x, max_y)) = points_bounding_box(&joint) else {
    return 0.0;
  };

  let width = (max_x - min_x + 1) as u32;
  let height = (max_y - min_y + 1) as u32;

  let raster_a = rasterize(a, min_x, min_y, width, height);
  let raster_b = rasterize(b, min_x, min_y, width, height);

  let mut intersection = 0u32;
  let mut union = 0u32;
  for (pa, pb) in raster_a.pixels().zip(raster_b.pixels()) {
    let in_a = pa[0] > 0;
    let in_b = pb[0] > 0;
    if in_a && in_b {
      intersection += 1;
    }
    if in_a || in_b {
      union += 1;
    }
  }

  if union == 0 {
    0.0
  } else {
    intersection as f32 / union as f32
  }
}

/// 在局部坐标系中填充多边形。不足 3 个独立点时返回空白图。
fn rasterize(polygon: &[Point<i32>], min_x: i32, min_y: i32, width: u32, height: u32) -> GrayImage {
  let mut image = GrayImage::new(width, height);

  let mut local: Vec<Point<i32>> = polygon
    .iter()
    .map(|p| Point::new(p.x - min_x, p.y - min_y))
    .collect();
  local.dedup();
  if local.len() > 1 && local.first() == local.last() {
    local.pop();
  }

  if local.len() >= 3 {
    draw_polygon_mut(&mut image, &local, Luma([255u8]));
  }

  image
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::Rect;

  fn square(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point<i32>> {
    vec![
      Point::new(x0, y0),
      Point::new(x1, y0),
      Point::new(x1, y1),
      Point::new(x0, y1),
    ]
  }

  fn det(score: f32, polygon: Vec<Point<i32>>) -> SegDetection {
    let (x0, y0, x1, y1) = points_bounding_box(&polygon).unwrap();
    SegDetection {
      score,
      polygon,
      bbox: Rect::new(x0, y0, x1, y1),
    }
  }

  #[test]
  fn identical_masks_have_unit_iou() {
    let a = square(0, 0, 10, 10);
    assert!((mask_iou(&a, &a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn disjoint_masks_have_zero_iou() {
    let a = square(0, 0, 10, 10);
    let b = square(50, 50, 60, 60);
    assert_eq!(mask_iou(&a, &b), 0.0);
  }

  #[test]
  fn overlapping_masks_iou_is_strictly_between_zero_and_one() {
    // 两个 11×11 方块水平错开一半，IoU 约 1/3。
    // 并集必须按位或统计，否则这里会得到 1。
    let a = square(0, 0, 10, 10);
    let b = square(5, 0, 15, 10);

    let iou = mask_iou(&a, &b);
    assert!(iou > 0.0 && iou < 1.0, "iou = {iou}");
    assert!((iou - 1.0 / 3.0).abs() < 0.1, "iou = {iou}");
  }

  #[test]
  fn empty_polygon_has_zero_iou() {
    let a = square(0, 0, 10, 10);
    assert_eq!(mask_iou(&a, &[]), 0.0);
    assert_eq!(mask_iou(&[], &a), 0.0);
  }

  #[test]
  fn duplicate_mask_is_suppressed() {
    let dets = vec![
      det(0.7, square(0, 0, 10, 10)),
      det(0.9, square(0, 0, 10, 10)),
    ];

    let keep = filter_duplicate_masks(dets, 0.8);
    assert_eq!(keep.len(), 1);
    assert!((keep[0].score - 0.9).abs() < 1e-6);
  }

  #[test]
  fn partial_overlap_respects_threshold() {
    let make = || {
      vec![
        det(0.9, square(0, 0, 10, 10)),
        det(0.7, square(5, 0, 15, 10)),
      ]
    };

    // IoU 约 1/3：阈值 0.8 时两者保留，阈值 0.2 时低分者被抑制
    assert_eq!(filter_duplicate_masks(make(), 0.8).len(), 2);
    assert_eq!(filter_duplicate_masks(make(), 0.2).len(), 1);
  }

  #[test]
  fn disjoint_masks_both_survive_in_score_order() {
    let dets = vec![
      det(0.6, square(0, 0, 10, 10)),
      det(0.9, square(50, 50, 60, 60)),
      det(0.8, square(100, 100, 110, 110)),
    ];

    let keep = filter_duplicate_masks(dets, 0.8);
    let scores: Vec<f32> = keep.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.8, 0.6]);
  }
}
