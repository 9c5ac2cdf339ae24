// 该文件是 Fenjian （分拣） 项目的一部分。
// src/frame.rs - 位图定义
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

use image::RgbImage;
use thiserror::Error;

const CHANNELS: usize = 3;

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelOrder {
  /// 显示端使用的顺序
  #[default]
  Rgb,
  Bgr,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("图像尺寸无效: {0}x{1}")]
  EmptyShape(u32, u32),
}

/// 三通道位图，NHWC 交错排列
///
/// 所有变换都返回新的位图，原始像素在标注之后依旧可读。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bitmap {
  width: u32,
  height: u32,
  order: ChannelOrder,
  data: Box<[u8]>,
}

impl Bitmap {
  pub fn new(
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyShape(width, height));
    }
    let expected = CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      order,
      data: data.into_boxed_slice(),
    })
  }

  pub fn from_rgb_image(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      order: ChannelOrder::Rgb,
      data: image.into_raw().into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn channels(&self) -> usize {
    CHANNELS
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  /// 读取 (x, y) 处的像素，按本位图自身的通道顺序返回
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  /// 以指定通道顺序复制出一张新位图
  pub fn to_order(&self, order: ChannelOrder) -> Bitmap {
    let mut data = self.data.clone();
    if order != self.order {
      for px in data.chunks_exact_mut(CHANNELS) {
        px.swap(0, 2);
      }
    }
    Bitmap {
      width: self.width,
      height: self.height,
      order,
      data,
    }
  }

  /// 转为显示端使用的 RGB 图像
  pub fn to_rgb_image(&self) -> RgbImage {
    self.to_order(ChannelOrder::Rgb).into_rgb_image()
  }

  pub fn into_rgb_image(self) -> RgbImage {
    let bitmap = if self.order == ChannelOrder::Rgb {
      self
    } else {
      self.to_order(ChannelOrder::Rgb)
    };
    let (width, height) = bitmap.dimensions();
    // 长度在构造时已经校验
    RgbImage::from_raw(width, height, bitmap.data.into_vec())
      .unwrap_or_else(|| RgbImage::new(width, height))
  }
}

impl From<RgbImage> for Bitmap {
  fn from(image: RgbImage) -> Self {
    Bitmap::from_rgb_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_length() {
    let err = Bitmap::new(2, 2, ChannelOrder::Rgb, vec![0; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
    assert_eq!(
      Bitmap::new(0, 4, ChannelOrder::Rgb, vec![]).unwrap_err(),
      FrameError::EmptyShape(0, 4)
    );
  }

  #[test]
  fn reorder_swaps_red_and_blue() {
    let bgr = Bitmap::new(1, 1, ChannelOrder::Bgr, vec![10, 20, 30]).unwrap();
    let rgb = bgr.to_order(ChannelOrder::Rgb);
    assert_eq!(rgb.order(), ChannelOrder::Rgb);
    assert_eq!(rgb.pixel(0, 0), Some([30, 20, 10]));
    // 源位图保持不变
    assert_eq!(bgr.pixel(0, 0), Some([10, 20, 30]));
    assert_eq!(bgr.to_rgb_image().get_pixel(0, 0).0, [30, 20, 10]);
  }

  #[test]
  fn same_order_is_plain_copy() {
    let rgb = Bitmap::new(2, 1, ChannelOrder::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(rgb.to_order(ChannelOrder::Rgb), rgb);
  }
}
