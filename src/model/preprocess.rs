// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/preprocess.rs - 模型输入预处理
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

use image::imageops::FilterType;

use crate::frame::Bitmap;

/// 填充色，与训练时的 letterbox 保持一致
pub const PAD_VALUE: u8 = 114;

/// 等比缩放加居中填充的几何关系
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub input_size: (u32, u32),
  pub source_size: (u32, u32),
}

impl Letterbox {
  pub fn fit(source_size: (u32, u32), input_size: (u32, u32)) -> Self {
    let (sw, sh) = source_size;
    let (iw, ih) = input_size;
    let scale = (iw as f32 / sw.max(1) as f32).min(ih as f32 / sh.max(1) as f32);
    let (rw, rh) = Self::resized(source_size, scale, input_size);
    Self {
      scale,
      pad_x: (iw - rw) / 2,
      pad_y: (ih - rh) / 2,
      input_size,
      source_size,
    }
  }

  fn resized(source_size: (u32, u32), scale: f32, input_size: (u32, u32)) -> (u32, u32) {
    let rw = ((source_size.0 as f32 * scale).round() as u32).clamp(1, input_size.0);
    let rh = ((source_size.1 as f32 * scale).round() as u32).clamp(1, input_size.1);
    (rw, rh)
  }

  pub fn resized_size(&self) -> (u32, u32) {
    Self::resized(self.source_size, self.scale, self.input_size)
  }

  /// 模型输入坐标映射回原图坐标，并裁剪到原图范围
  pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    let sx = (x - self.pad_x as f32) / self.scale;
    let sy = (y - self.pad_y as f32) / self.scale;
    (
      sx.clamp(0.0, self.source_size.0 as f32),
      sy.clamp(0.0, self.source_size.1 as f32),
    )
  }

  /// 原图坐标映射到模型输入坐标
  pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
    (
      x * self.scale + self.pad_x as f32,
      y * self.scale + self.pad_y as f32,
    )
  }
}

/// 将 RGB 位图转换为 `[1, 3, H, W]` 的归一化浮点张量数据
pub fn letterbox(bitmap: &Bitmap, input_size: (u32, u32)) -> (Vec<f32>, Letterbox) {
  let geometry = Letterbox::fit(bitmap.dimensions(), input_size);
  let (rw, rh) = geometry.resized_size();
  let resized = image::imageops::resize(&bitmap.to_rgb_image(), rw, rh, FilterType::Triangle);

  let (width, height) = (input_size.0 as usize, input_size.1 as usize);
  let plane = width * height;
  let mut data = vec![PAD_VALUE as f32 / 255.0; 3 * plane];

  for (x, y, pixel) in resized.enumerate_pixels() {
    let h = (y + geometry.pad_y) as usize;
    let w = (x + geometry.pad_x) as usize;
    let idx = h * width + w;
    for c in 0..3 {
      data[c * plane + idx] = pixel[c] as f32 / 255.0;
    }
  }

  (data, geometry)
}
