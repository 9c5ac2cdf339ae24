// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model.rs - 模型
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

use image::GrayImage;

use crate::frame::Bitmap;

/// 检测/分割能力
///
/// 模型自行负责缩放等预处理，输入总是 RGB 顺序的三通道位图。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &Bitmap) -> Result<DetectResult, Self::Error>;
  fn class_catalog(&self) -> &ClassCatalog;

  /// 模型是否允许多个推理同时进行
  fn discipline(&self) -> InferenceDiscipline {
    InferenceDiscipline::Concurrent
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
  /// 与原图同尺寸，非零像素属于该目标
  pub mask: Option<GrayImage>,
}

impl DetectItem {
  pub fn new(class_id: u32, score: f32, bbox: [f32; 4]) -> Self {
    Self {
      class_id,
      score,
      bbox,
      mask: None,
    }
  }

  pub fn with_mask(mut self, mask: GrayImage) -> Self {
    self.mask = Some(mask);
    self
  }
}

/// 检测结果，保持模型原生输出顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectResult {
  type Item = &'a DetectItem;
  type IntoIter = std::slice::Iter<'a, DetectItem>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

mod catalog;
pub use self::catalog::{CatalogError, ClassCatalog};

mod invoker;
pub use self::invoker::{InferenceDiscipline, InferenceError, InferenceInvoker};

pub mod postprocess;
pub mod preprocess;

#[cfg(feature = "model_yolov8_seg")]
mod yolov8_seg;
#[cfg(feature = "model_yolov8_seg")]
pub use self::yolov8_seg::{Yolov8Seg, Yolov8SegBuilder, Yolov8SegError};
