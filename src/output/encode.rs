// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/encode.rs - 位图编码
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

use image::codecs::{jpeg::JpegEncoder, png::PngEncoder};

use crate::frame::Bitmap;

const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
  Png,
  Jpeg { quality: u8 },
}

impl EncodeFormat {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_ascii_lowercase().as_str() {
      "png" => Some(EncodeFormat::Png),
      "jpg" | "jpeg" => Some(EncodeFormat::Jpeg {
        quality: DEFAULT_JPEG_QUALITY,
      }),
      _ => None,
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      EncodeFormat::Png => "png",
      EncodeFormat::Jpeg { .. } => "jpg",
    }
  }
}

/// 按显示端的 RGB 顺序编码
pub fn encode(bitmap: &Bitmap, format: EncodeFormat) -> Result<Vec<u8>, image::ImageError> {
  let image = bitmap.to_rgb_image();
  let mut bytes = Vec::new();
  match format {
    EncodeFormat::Png => image.write_with_encoder(PngEncoder::new(&mut bytes))?,
    EncodeFormat::Jpeg { quality } => {
      image.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?
    }
  }
  Ok(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ChannelOrder;

  #[test]
  fn png_keeps_pixels_in_rgb_order() {
    let bgr = Bitmap::new(2, 1, ChannelOrder::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let bytes = encode(&bgr, EncodeFormat::Png).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().into_rgb8();
    assert_eq!(decoded.get_pixel(0, 0).0, [3, 2, 1]);
    assert_eq!(decoded.get_pixel(1, 0).0, [6, 5, 4]);
  }

  #[test]
  fn jpeg_has_magic_bytes() {
    let bitmap = Bitmap::new(4, 4, ChannelOrder::Rgb, vec![128; 48]).unwrap();
    let bytes = encode(&bitmap, EncodeFormat::from_extension("JPG").unwrap()).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(EncodeFormat::from_extension("gif"), None);
    assert_eq!(EncodeFormat::Png.extension(), "png");
  }
}
