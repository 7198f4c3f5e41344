// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/frame.rs - NCHW 归一化帧定义
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

use image::{RgbImage, imageops};

const RGB_CHANNELS: usize = 3;

/// 归一化到 [0,1] 的 RGB NCHW 浮点帧，尺寸由模型配置决定。
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl RgbNchwFrame {
  pub fn with_shape(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * (width as usize) * (height as usize);
    RgbNchwFrame {
      width,
      height,
      data: vec![0.0; size].into_boxed_slice(),
    }
  }

  /// 把任意尺寸的 RGB 图像转换成模型输入帧：
  /// 双线性缩放到目标尺寸，按通道平面排列，像素值除以 255。
  pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);

    let mut frame = RgbNchwFrame::with_shape(width, height);
    let plane = (width as usize) * (height as usize);
    let slice = frame.data.as_mut();

    for (x, y, pixel) in resized.enumerate_pixels() {
      let base = (y as usize) * (width as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        slice[c * plane + base] = pixel[c] as f32 / 255.0;
      }
    }

    frame
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}
