// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/model/segment.rs - 实例分割模型包装
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Mutex;

use image::RgbImage;
use tracing::{debug, trace};

use crate::engine::{Engine, OUTPUT_DET, OUTPUT_PROTO};
use crate::frame::RgbNchwFrame;
use crate::model::{ModelConfig, ModelError, SegDetection};
use crate::postprocess::Point;
use crate::postprocess::dedup::filter_duplicate_masks;
use crate::postprocess::mask::{decode_seg_candidates, extract_polygon, proto_view};
use crate::postprocess::nms::nms_indices;

/// 实例分割模型：候选解码、框 NMS、掩膜重建与掩膜去重的完整流水线。
///
/// 掩膜重建放在 NMS 之后，只为保留下来的候选求解，
/// 空多边形的实例直接丢弃。
pub struct YoloSegmenter<E: Engine> {
  engine: Mutex<E>,
  cfg: ModelConfig,
}

impl<E: Engine> YoloSegmenter<E> {
  pub fn new(engine: E, cfg: ModelConfig) -> Self {
    YoloSegmenter {
      engine: Mutex::new(engine),
      cfg,
    }
  }

  pub fn config(&self) -> &ModelConfig {
    &self.cfg
  }

  /// 对一帧图像执行实例分割，返回分数降序的结果。
  pub fn detect_instances(
    &self,
    image: &RgbImage,
  ) -> Result<Vec<SegDetection>, ModelError<E::Error>> {
    let orig_size = (image.width(), image.height());
    let input_size = (self.cfg.size.width, self.cfg.size.height);
    let frame = RgbNchwFrame::from_image(image, input_size.0, input_size.1);

    let mut engine = self
      .engine
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);

    trace!("执行分割推理");
    let outputs = engine.infer(&frame).map_err(ModelError::Engine)?;
    let det = outputs.get(OUTPUT_DET)?;
    let proto_tensor = outputs.get(OUTPUT_PROTO)?;

    let candidates =
      decode_seg_candidates(&det.view(), input_size, orig_size, self.cfg.conf_threshold)?;
    let proto = proto_view(&proto_tensor.view())?;

    let boxes: Vec<_> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<_> = candidates.iter().map(|c| c.score).collect();
    let keep = nms_indices(&boxes, &scores, self.cfg.nms_threshold);

    let mut instances = Vec::with_capacity(keep.len());
    for i in keep {
      let c = &candidates[i];
      let Some(polygon) =
        extract_polygon(&c.coeffs, &proto, orig_size, self.cfg.simplify_tolerance)
      else {
        continue;
      };

      instances.push(SegDetection {
        score: c.score,
        polygon,
        bbox: c.bbox,
      });
    }

    let instances = filter_duplicate_masks(instances, self.cfg.mask_dedup_threshold);
    debug!("分割得到 {} 个实例", instances.len());
    Ok(instances)
  }

  /// 只要掩膜多边形，不要分数与外接框。
  pub fn detect_polygons(
    &self,
    image: &RgbImage,
  ) -> Result<Vec<Vec<Point<i32>>>, ModelError<E::Error>> {
    Ok(
      self
        .detect_instances(image)?
        .into_iter()
        .map(|d| d.polygon)
        .collect(),
    )
  }
}
