// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/engine.rs - 推理引擎接口
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::frame::RgbNchwFrame;
use crate::tensor::Outputs;

/// 检测头输出张量名称。
pub const OUTPUT_DET: &str = "output0";
/// 分割原型张量名称。
pub const OUTPUT_PROTO: &str = "output1";

/// 外部推理引擎：接收归一化 NCHW 帧，返回按名称索引的输出张量。
/// 会话本身不保证并发安全，模型包装层负责串行化调用。
pub trait Engine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&mut self, frame: &RgbNchwFrame) -> Result<Outputs, Self::Error>;
}

#[cfg(feature = "ort_engine")]
mod ort_engine;
#[cfg(feature = "ort_engine")]
pub use self::ort_engine::{OrtEngine, OrtEngineBuilder, OrtEngineError};
