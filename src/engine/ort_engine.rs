// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/engine/ort_engine.rs - ONNX Runtime 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::engine::Engine;
use crate::frame::RgbNchwFrame;
use crate::tensor::{Outputs, Tensor, TensorError};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum OrtEngineError {
  #[error("ONNX 会话错误: {0}")]
  Session(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error(transparent)]
  Tensor(#[from] TensorError),
}

/// 基于 ONNX Runtime 的推理引擎。
pub struct OrtEngine {
  session: Session,
  input_name: String,
  output_names: Vec<String>,
}

pub struct OrtEngineBuilder {
  model_path: String,
}

const ORT_ENGINE_SCHEME: &str = "onnx";

impl FromUrl for OrtEngineBuilder {
  type Error = OrtEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != ORT_ENGINE_SCHEME {
      return Err(OrtEngineError::ModelPath(format!(
        "模型路径必须使用 {} 方案",
        ORT_ENGINE_SCHEME
      )));
    }

    Ok(OrtEngineBuilder {
      model_path: url.path().to_string(),
    })
  }
}

impl FromUrlWithScheme for OrtEngineBuilder {
  const SCHEME: &'static str = ORT_ENGINE_SCHEME;
}

impl OrtEngineBuilder {
  pub fn build(self) -> Result<OrtEngine, OrtEngineError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(&self.model_path)?;

    let input_name = session
      .inputs
      .first()
      .map(|i| i.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    info!("模型加载完成");
    debug!("模型输入: {}", input_name);
    debug!("模型输出: {:?}", output_names);

    Ok(OrtEngine {
      session,
      input_name,
      output_names,
    })
  }
}

impl Engine for OrtEngine {
  type Error = OrtEngineError;

  fn infer(&mut self, frame: &RgbNchwFrame) -> Result<Outputs, Self::Error> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    let array = Array4::from_shape_vec(
      (1, frame.channels(), height, width),
      frame.as_nchw().to_vec(),
    )
    .map_err(|_| TensorError::BufferMismatch {
      len: frame.as_nchw().len(),
      shape: vec![1, frame.channels(), height, width],
    })?;

    debug!("执行模型推理");
    let array = array.as_standard_layout();
    let input_tensor = TensorRef::from_array_view(&array)?;
    let session_outputs = self
      .session
      .run(ort::inputs![&self.input_name => input_tensor])?;

    let mut outputs = Outputs::default();
    for name in &self.output_names {
      let value = session_outputs
        .get(name.as_str())
        .ok_or_else(|| TensorError::MissingOutput(name.clone()))?;
      let (shape, data) = value.try_extract_tensor::<f32>()?;
      let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      outputs.push(name.clone(), Tensor::new(data.to_vec(), shape)?);
    }

    debug!("模型返回 {} 个输出张量", outputs.len());
    Ok(outputs)
  }
}
