// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/normalize.rs - 图像解码与归一化
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

use image::{DynamicImage, ImageFormat, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::{frame::Bitmap, input::RawUpload};

/// 允许上传的扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("上传内容为空")]
  Empty,
  #[error("不支持的文件扩展名: {0}")]
  UnsupportedExtension(String),
  #[error("不支持的图像格式: {0:?}")]
  UnsupportedFormat(ImageFormat),
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
}

/// 将上传字节解码为 RGB 位图
///
/// 带透明通道的图像会逐像素合成到不透明背景上，输出严格为三通道。
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
  background: [u8; 3],
}

impl Default for ImageNormalizer {
  fn default() -> Self {
    Self {
      background: DEFAULT_BACKGROUND,
    }
  }
}

impl ImageNormalizer {
  pub fn with_background(mut self, background: [u8; 3]) -> Self {
    self.background = background;
    self
  }

  pub fn background(&self) -> [u8; 3] {
    self.background
  }

  pub fn normalize(&self, raw: &RawUpload) -> Result<Bitmap, DecodeError> {
    if raw.is_empty() {
      return Err(DecodeError::Empty);
    }

    if let Some(ext) = raw.extension()
      && !SUPPORTED_EXTENSIONS.contains(&ext)
    {
      return Err(DecodeError::UnsupportedExtension(ext.to_string()));
    }

    let format = image::guess_format(raw.bytes())?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
      return Err(DecodeError::UnsupportedFormat(format));
    }

    let image = image::load_from_memory_with_format(raw.bytes(), format)?;
    debug!(
      "解码上传图像: {:?} {}x{} {:?}",
      format,
      image.width(),
      image.height(),
      image.color()
    );

    Ok(Bitmap::from_rgb_image(self.flatten(image)))
  }

  fn flatten(&self, image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
      return image.into_rgb8();
    }

    let rgba = image.into_rgba8();
    let bg = self.background;
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
      let [r, g, b, a] = rgba.get_pixel(x, y).0;
      let a = a as u32;
      let blend = |c: u8, bg: u8| ((c as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8;
      image::Rgb([blend(r, bg[0]), blend(g, bg[1]), blend(b, bg[2])])
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{Rgba, RgbaImage};

  use super::*;

  fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), format)
      .unwrap();
    bytes
  }

  #[test]
  fn flattens_alpha_onto_background() {
    let mut rgba = RgbaImage::new(3, 1);
    rgba.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
    rgba.put_pixel(1, 0, Rgba([10, 20, 30, 0]));
    rgba.put_pixel(2, 0, Rgba([0, 0, 0, 128]));
    let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

    let bitmap = ImageNormalizer::default()
      .normalize(&RawUpload::new(bytes, Some("png")))
      .unwrap();

    assert_eq!(bitmap.channels(), 3);
    assert_eq!(bitmap.pixel(0, 0), Some([10, 20, 30]));
    assert_eq!(bitmap.pixel(1, 0), Some([255, 255, 255]));
    assert_eq!(bitmap.pixel(2, 0), Some([127, 127, 127]));
  }

  #[test]
  fn custom_background() {
    let rgba = RgbaImage::from_pixel(2, 2, Rgba([200, 0, 0, 0]));
    let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
    let bitmap = ImageNormalizer::default()
      .with_background([0, 0, 0])
      .normalize(&RawUpload::new(bytes, None))
      .unwrap();
    assert_eq!(bitmap.pixel(1, 1), Some([0, 0, 0]));
  }

  #[test]
  fn decodes_jpeg() {
    let rgb = RgbImage::from_pixel(8, 6, image::Rgb([90, 120, 150]));
    let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg);
    let bitmap = ImageNormalizer::default()
      .normalize(&RawUpload::new(bytes, Some("jpeg")))
      .unwrap();
    assert_eq!(bitmap.dimensions(), (8, 6));
  }

  #[test]
  fn empty_bytes_are_rejected() {
    let err = ImageNormalizer::default()
      .normalize(&RawUpload::new(Vec::<u8>::new(), Some("png")))
      .unwrap_err();
    assert!(matches!(err, DecodeError::Empty));
  }

  #[test]
  fn truncated_png_is_decode_error() {
    let rgb = RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3]));
    let mut bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
    bytes.truncate(20);
    let err = ImageNormalizer::default()
      .normalize(&RawUpload::new(bytes, Some("png")))
      .unwrap_err();
    assert!(matches!(err, DecodeError::Image(_)));
  }

  #[test]
  fn garbage_is_decode_error() {
    let err = ImageNormalizer::default()
      .normalize(&RawUpload::new(b"definitely not an image".to_vec(), None))
      .unwrap_err();
    assert!(matches!(err, DecodeError::Image(_)));
  }

  #[test]
  fn unsupported_extension_and_format() {
    let err = ImageNormalizer::default()
      .normalize(&RawUpload::new(vec![1u8, 2, 3], Some("gif")))
      .unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedExtension(ext) if ext == "gif"));

    let gif_header = b"GIF89a\x01\x00\x01\x00\x00\x00\x00".to_vec();
    let err = ImageNormalizer::default()
      .normalize(&RawUpload::new(gif_header, None))
      .unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedFormat(ImageFormat::Gif)));
  }
}
