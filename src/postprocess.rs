// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/postprocess.rs - 后处理公共几何
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub mod decode;
pub mod dedup;
pub mod mask;
pub mod nms;

pub use imageproc::point::Point;

/// 原图像素坐标系下的轴对齐整数框，角点形式。
/// 解码器保证 `x0 < x1 && y0 < y1`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
  pub x0: i32,
  pub y0: i32,
  pub x1: i32,
  pub y1: i32,
}

impl Rect {
  pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
    Rect { x0, y0, x1, y1 }
  }

  pub fn width(&self) -> i32 {
    self.x1 - self.x0
  }

  pub fn height(&self) -> i32 {
    self.y1 - self.y0
  }

  pub fn area(&self) -> i64 {
    (self.width() as i64) * (self.height() as i64)
  }

  /// 交并比。交集为空时返回 0。
  pub fn iou(&self, other: &Rect) -> f32 {
    let x0 = self.x0.max(other.x0);
    let y0 = self.y0.max(other.y0);
    let x1 = self.x1.min(other.x1);
    let y1 = self.y1.min(other.y1);

    if x1 <= x0 || y1 <= y0 {
      return 0.0;
    }

    let intersection = ((x1 - x0) as i64) * ((y1 - y0) as i64);
    let union = self.area() + other.area() - intersection;

    if union > 0 {
      intersection as f32 / union as f32
    } else {
      0.0
    }
  }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 多边形有向面积的绝对值（鞋带公式）。
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
  if points.len() < 3 {
    return 0.0;
  }

  let mut doubled = 0i64;
  for i in 0..points.len() {
    let a = points[i];
    let b = points[(i + 1) % points.len()];
    doubled += (a.x as i64) * (b.y as i64) - (b.x as i64) * (a.y as i64);
  }

  (doubled.abs() as f64) / 2.0
}

/// 点集的最小外接范围 `(min_x, min_y, max_x, max_y)`。
pub fn points_bounding_box(points: &[Point<i32>]) -> Option<(i32, i32, i32, i32)> {
  let first = points.first()?;
  let mut bounds = (first.x, first.y, first.x, first.y);

  for p in points {
    bounds.0 = bounds.0.min(p.x);
    bounds.1 = bounds.1.min(p.y);
    bounds.2 = bounds.2.max(p.x);
    bounds.3 = bounds.3.max(p.y);
  }

  Some(bounds)
}
