// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/model/detect.rs - 目标检测模型包装
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

use crate::engine::{Engine, OUTPUT_DET};
use crate::frame::RgbNchwFrame;
use crate::model::{Detection, ModelConfig, ModelError};
use crate::postprocess::decode::decode_detections;
use crate::postprocess::nms::nms_indices;

/// 目标检测模型：预处理、推理、解码与 NMS 的完整流水线。
///
/// 引擎放在互斥锁后面，同一实例可被多个线程共享；
/// 锁覆盖整次调用，推理与后处理串行执行。
pub struct YoloDetector<E: Engine> {
  engine: Mutex<E>,
  cfg: ModelConfig,
}

impl<E: Engine> YoloDetector<E> {
  pub fn new(engine: E, cfg: ModelConfig) -> Self {
    YoloDetector {
      engine: Mutex::new(engine),
      cfg,
    }
  }

  pub fn config(&self) -> &ModelConfig {
    &self.cfg
  }

  /// 对一帧图像执行检测，返回置信度降序的结果。
  pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError<E::Error>> {
    let class_list = self
      .cfg
      .class_list
      .as_deref()
      .ok_or(ModelError::MissingClassList)?;

    let orig_size = (image.width(), image.height());
    let input_size = (self.cfg.size.width, self.cfg.size.height);
    let frame = RgbNchwFrame::from_image(image, input_size.0, input_size.1);

    let mut engine = self
      .engine
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);

    trace!("执行检测推理");
    let outputs = engine.infer(&frame).map_err(ModelError::Engine)?;
    let output = outputs.get(OUTPUT_DET)?;

    let candidates =
      decode_detections(&output.view(), input_size, orig_size, self.cfg.conf_threshold)?;

    let boxes: Vec<_> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<_> = candidates.iter().map(|c| c.score).collect();
    let keep = nms_indices(&boxes, &scores, self.cfg.nms_threshold);

    let mut detections = Vec::with_capacity(keep.len());
    for i in keep {
      let c = &candidates[i];
      let class_name = class_list
        .get(c.class_id)
        .ok_or(ModelError::ClassIndex {
          class_id: c.class_id,
          num_classes: class_list.len(),
        })?
        .clone();

      detections.push(Detection {
        class_id: c.class_id,
        class_name,
        confidence: c.score,
        bbox: c.bbox,
      });
    }

    debug!("检测到 {} 个目标", detections.len());
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::OUTPUT_DET;
  use crate::model::Size;
  use crate::tensor::{Outputs, Tensor};

  struct StubEngine {
    outputs: Outputs,
  }

  impl Engine for StubEngine {
    type Error = std::convert::Infallible;

    fn infer(&mut self, _frame: &RgbNchwFrame) -> Result<Outputs, Self::Error> {
      Ok(self.outputs.clone())
    }
  }

  fn config(classes: Option<Vec<&str>>) -> ModelConfig {
    ModelConfig {
      size: Size {
        width: 64,
        height: 64,
      },
      conf_threshold: 0.5,
      nms_threshold: 0.45,
      class_list: classes.map(|c| c.into_iter().map(String::from).collect()),
      simplify_tolerance: 0.005,
      mask_dedup_threshold: 0.8,
    }
  }

  /// 两个类别、三个锚点的检测头张量。
  fn det_tensor(anchors: &[(usize, [f32; 6])]) -> Tensor {
    let n = 3;
    let mut data = vec![0.0f32; 6 * n];
    for &(anchor, features) in anchors {
      for (f, value) in features.iter().enumerate() {
        data[f * n + anchor] = *value;
      }
    }
    Tensor::new(data, vec![1, 6, n]).unwrap()
  }

  #[test]
  fn detect_decodes_and_labels() {
    let tensor = det_tensor(&[(0, [32.0, 32.0, 16.0, 16.0, 0.2, 0.9])]);
    let mut outputs = Outputs::default();
    outputs.push(OUTPUT_DET.to_string(), tensor);

    let detector = YoloDetector::new(
      StubEngine { outputs },
      config(Some(vec!["person", "car"])),
    );

    let image = RgbImage::new(64, 64);
    let dets = detector.detect(&image).unwrap();

    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_id, 1);
    assert_eq!(dets[0].class_name, "car");
    assert!((dets[0].confidence - 0.9).abs() < 1e-6);
  }

  #[test]
  fn detect_suppresses_overlapping_boxes() {
    let tensor = det_tensor(&[
      (0, [32.0, 32.0, 16.0, 16.0, 0.9, 0.0]),
      (1, [33.0, 33.0, 16.0, 16.0, 0.7, 0.0]),
      (2, [10.0, 10.0, 8.0, 8.0, 0.8, 0.0]),
    ]);
    let mut outputs = Outputs::default();
    outputs.push(OUTPUT_DET.to_string(), tensor);

    let detector = YoloDetector::new(StubEngine { outputs }, config(Some(vec!["person"])));

    let image = RgbImage::new(64, 64);
    let dets = detector.detect(&image).unwrap();

    let confidences: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.8]);
  }

  #[test]
  fn missing_class_list_is_fatal() {
    let detector = YoloDetector::new(
      StubEngine {
        outputs: Outputs::default(),
      },
      config(None),
    );

    let image = RgbImage::new(64, 64);
    assert!(matches!(
      detector.detect(&image),
      Err(ModelError::MissingClassList)
    ));
  }

  #[test]
  fn out_of_range_class_id_is_fatal() {
    let tensor = det_tensor(&[(0, [32.0, 32.0, 16.0, 16.0, 0.2, 0.9])]);
    let mut outputs = Outputs::default();
    outputs.push(OUTPUT_DET.to_string(), tensor);

    // 配置只有一个类别，argmax 会落在下标 1
    let detector = YoloDetector::new(StubEngine { outputs }, config(Some(vec!["person"])));

    let image = RgbImage::new(64, 64);
    assert!(matches!(
      detector.detect(&image),
      Err(ModelError::ClassIndex {
        class_id: 1,
        num_classes: 1
      })
    ));
  }

  #[test]
  fn missing_output_tensor_is_reported() {
    let detector = YoloDetector::new(
      StubEngine {
        outputs: Outputs::default(),
      },
      config(Some(vec!["person"])),
    );

    let image = RgbImage::new(64, 64);
    assert!(matches!(
      detector.detect(&image),
      Err(ModelError::Tensor(_))
    ));
  }
}
