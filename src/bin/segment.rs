// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/bin/segment.rs - 实例分割演示
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use cangshan::{
  FromUrl,
  engine::OrtEngineBuilder,
  input::ImageFileInput,
  model::{ModelConfig, YoloSegmenter},
};

/// Cangshan 实例分割参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 模型配置文件 (JSON)
  #[arg(long, value_name = "CONFIG")]
  pub config: PathBuf,
  /// 输入图像来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("配置文件路径: {}", args.config.display());
  info!("输入来源: {}", args.input);

  let cfg = ModelConfig::from_json_file(&args.config)?;
  let input = ImageFileInput::from_url(&args.input)?;
  let engine = OrtEngineBuilder::from_url(&args.model)?.build()?;
  let segmenter = YoloSegmenter::new(engine, cfg);

  info!("开始推理...");
  for image in input {
    let now = std::time::Instant::now();
    let instances = segmenter.detect_instances(&image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let report: Vec<_> = instances
      .iter()
      .map(|d| {
        serde_json::json!({
          "score": d.score,
          "bbox": [d.bbox.x0, d.bbox.y0, d.bbox.x1, d.bbox.y1],
          "polygon": d.polygon.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
        })
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
  }

  Ok(())
}
