// 该文件是 Cangshan （苍山洱海） 项目的一部分。
// src/tensor.rs - 张量与形状校验视图
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("张量形状不匹配: 期望 {expected}, 实际 {actual:?}")]
  ShapeMismatch { expected: String, actual: Vec<usize> },
  #[error("张量数据长度 {len} 与形状 {shape:?} 不一致")]
  BufferMismatch { len: usize, shape: Vec<usize> },
  #[error("输出张量缺失: {0}")]
  MissingOutput(String),
}

/// 推理引擎输出的单个张量：扁平 f32 缓冲区加显式形状。
#[derive(Debug, Clone)]
pub struct Tensor {
  data: Box<[f32]>,
  shape: Box<[usize]>,
}

impl Tensor {
  /// 构造张量，校验缓冲区长度与形状乘积一致。
  pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, TensorError> {
    let expected: usize = shape.iter().product();
    if data.len() != expected {
      return Err(TensorError::BufferMismatch {
        len: data.len(),
        shape,
      });
    }

    Ok(Tensor {
      data: data.into_boxed_slice(),
      shape: shape.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn view(&self) -> TensorView<'_> {
    TensorView::new(&self.data, &self.shape)
  }
}

/// 行主序张量视图。先用 [`TensorView::expect_shape`] 校验形状契约，
/// 再做索引运算，越界访问以错误形式暴露而不是悄悄读坏内存。
#[derive(Debug, Clone)]
pub struct TensorView<'a> {
  data: &'a [f32],
  shape: &'a [usize],
  strides: Box<[usize]>,
}

impl<'a> TensorView<'a> {
  fn new(data: &'a [f32], shape: &'a [usize]) -> Self {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
      strides[i] = strides[i + 1] * shape[i + 1];
    }

    TensorView {
      data,
      shape,
      strides: strides.into_boxed_slice(),
    }
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  pub fn shape(&self) -> &[usize] {
    self.shape
  }

  pub fn dim(&self, axis: usize) -> usize {
    self.shape.get(axis).copied().unwrap_or(0)
  }

  /// 校验形状契约。`None` 表示该维度任意，`Some(n)` 表示必须等于 n。
  /// 秩不同或任一固定维不匹配都返回 [`TensorError::ShapeMismatch`]。
  pub fn expect_shape(&self, pattern: &[Option<usize>]) -> Result<(), TensorError> {
    let matched = self.shape.len() == pattern.len()
      && pattern
        .iter()
        .zip(self.shape.iter())
        .all(|(want, &got)| want.map(|w| w == got).unwrap_or(true));

    if matched {
      return Ok(());
    }

    let expected = pattern
      .iter()
      .map(|d| match d {
        Some(n) => n.to_string(),
        None => "_".to_string(),
      })
      .collect::<Vec<_>>()
      .join(", ");

    Err(TensorError::ShapeMismatch {
      expected: format!("[{}]", expected),
      actual: self.shape.to_vec(),
    })
  }

  /// 带边界检查的多维访问。
  pub fn at(&self, index: &[usize]) -> Option<f32> {
    if index.len() != self.shape.len() {
      return None;
    }
    let mut offset = 0usize;
    for (axis, &i) in index.iter().enumerate() {
      if i >= self.shape[axis] {
        return None;
      }
      offset += i * self.strides[axis];
    }
    self.data.get(offset).copied()
  }

  /// 校验后的整块数据访问，供解码器做热路径索引运算。
  /// 返回值的生命周期跟随底层缓冲区，不受视图借用限制。
  pub fn data(&self) -> &'a [f32] {
    self.data
  }
}

/// 推理引擎按名称返回的输出张量集合。
#[derive(Debug, Clone, Default)]
pub struct Outputs {
  tensors: Vec<(String, Tensor)>,
}

impl Outputs {
  pub fn push(&mut self, name: impl Into<String>, tensor: Tensor) {
    self.tensors.push((name.into(), tensor));
  }

  pub fn get(&self, name: &str) -> Result<&Tensor, TensorError> {
    self
      .tensors
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, t)| t)
      .ok_or_else(|| TensorError::MissingOutput(name.to_string()))
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}
