// 该文件是 Fenjian （分拣） 项目的一部分。
// tests/common/mod.rs - 集成测试公共设施
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

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{
  ImageEncoder, RgbImage, RgbaImage,
  codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use thiserror::Error;

use fenjian::{
  Bitmap, RawUpload,
  model::{ClassCatalog, DetectItem, DetectResult, InferenceDiscipline, Model},
};

#[derive(Debug, Error)]
#[error("fake backend failure")]
pub struct FakeError;

/// 按脚本返回固定检测结果的模型，记录收到的输入
pub struct FakeModel {
  catalog: ClassCatalog,
  items: Vec<DetectItem>,
  fail: bool,
  delay: Duration,
  discipline: InferenceDiscipline,
  pub seen: Mutex<Vec<Bitmap>>,
  active: AtomicUsize,
  pub peak: AtomicUsize,
}

impl FakeModel {
  pub fn new(catalog: ClassCatalog, items: Vec<DetectItem>) -> Self {
    Self {
      catalog,
      items,
      fail: false,
      delay: Duration::ZERO,
      discipline: InferenceDiscipline::Concurrent,
      seen: Mutex::new(Vec::new()),
      active: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
    }
  }

  pub fn failing(catalog: ClassCatalog) -> Self {
    Self {
      fail: true,
      ..Self::new(catalog, Vec::new())
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn with_discipline(mut self, discipline: InferenceDiscipline) -> Self {
    self.discipline = discipline;
    self
  }

  pub fn calls(&self) -> usize {
    self.seen.lock().unwrap().len()
  }
}

impl Model for FakeModel {
  type Error = FakeError;

  fn infer(&self, input: &Bitmap) -> Result<DetectResult, Self::Error> {
    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(active, Ordering::SeqCst);
    std::thread::sleep(self.delay);
    self.seen.lock().unwrap().push(input.clone());
    self.active.fetch_sub(1, Ordering::SeqCst);

    if self.fail {
      return Err(FakeError);
    }
    Ok(self.items.clone().into())
  }

  fn class_catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  fn discipline(&self) -> InferenceDiscipline {
    self.discipline
  }
}

pub fn waste_catalog() -> ClassCatalog {
  ClassCatalog::from_entries([(0, "metal"), (2, "plastic"), (5, "paper")]).unwrap()
}

pub fn gradient(width: u32, height: u32) -> RgbImage {
  RgbImage::from_fn(width, height, |x, y| {
    image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) * 3 % 256) as u8])
  })
}

pub fn png_upload(image: &RgbImage) -> RawUpload {
  let mut bytes = Vec::new();
  PngEncoder::new(&mut bytes)
    .write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)
    .unwrap();
  RawUpload::with_file_name(bytes, "upload.png")
}

pub fn rgba_png_upload(image: &RgbaImage) -> RawUpload {
  let mut bytes = Vec::new();
  PngEncoder::new(&mut bytes)
    .write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)
    .unwrap();
  RawUpload::with_file_name(bytes, "upload.png")
}

pub fn jpeg_upload(image: &RgbImage) -> RawUpload {
  let mut bytes = Vec::new();
  JpegEncoder::new_with_quality(&mut bytes, 95)
    .write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)
    .unwrap();
  RawUpload::with_file_name(bytes, "upload.jpg")
}
