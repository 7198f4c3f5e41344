// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/model.rs - 模型配置与检测结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::postprocess::{Point, Rect};
use crate::tensor::TensorError;

/// 模型实例的只读配置。检测与分割模型共用同一结构，
/// 分割模型没有类别列表。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelConfig {
  pub size: Size,
  pub conf_threshold: f32,
  #[serde(rename = "NMS-threshold")]
  pub nms_threshold: f32,
  #[serde(default)]
  pub class_list: Option<Vec<String>>,
  /// 多边形简化容差，乘以轮廓周长得到 epsilon。
  #[serde(default = "default_simplify_tolerance")]
  pub simplify_tolerance: f32,
  /// 掩膜去重的 IoU 阈值。
  #[serde(default = "default_mask_dedup_threshold")]
  pub mask_dedup_threshold: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

fn default_simplify_tolerance() -> f32 {
  0.005
}

fn default_mask_dedup_threshold() -> f32 {
  0.8
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  Parse(#[from] serde_json::Error),
}

impl ModelConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
  }
}

/// 检测模式的最终输出。
#[derive(Debug, Clone)]
pub struct Detection {
  pub class_id: usize,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: Rect,
}

/// 分割模式的最终输出：实例掩膜边界多边形加外接框。
#[derive(Debug, Clone)]
pub struct SegDetection {
  pub score: f32,
  pub polygon: Vec<Point<i32>>,
  pub bbox: Rect,
}

#[derive(Error, Debug)]
pub enum ModelError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error("推理引擎错误: {0}")]
  Engine(#[source] E),
  #[error(transparent)]
  Tensor(#[from] TensorError),
  #[error("类别编号越界: {class_id} 超出配置的 {num_classes} 个类别")]
  ClassIndex { class_id: usize, num_classes: usize },
  #[error("模型配置缺少类别列表")]
  MissingClassList,
}

mod detect;
pub use self::detect::YoloDetector;

mod segment;
pub use self::segment::YoloSegmenter;
