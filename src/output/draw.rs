// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/draw.rs - 检测与分割结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Bitmap,
  model::{ClassCatalog, DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: u32 = 4;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]); // 白色
const BOX_THICKNESS: u32 = 2;
const MASK_ALPHA: f32 = 0.5;
const PALETTE_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("第 {index} 个检测框几何无效: {bbox:?}")]
  InvalidGeometry { index: usize, bbox: [f32; 4] },
  #[error("第 {index} 个掩码尺寸 {actual:?} 与图像尺寸 {expected:?} 不符")]
  MaskSize {
    index: usize,
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("类别索引 {0} 不在类别表中")]
  UnknownClass(u32),
  #[error("无法加载字体")]
  Font,
  #[error("渲染线程异常退出")]
  WorkerPanicked,
}

#[derive(Debug, Clone)]
pub struct DrawConfig {
  pub font_size: f32,
  pub show_score: bool,
  pub draw_masks: bool,
  pub mask_alpha: f32,
  pub box_thickness: u32,
}

impl Default for DrawConfig {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      show_score: true,
      draw_masks: true,
      mask_alpha: MASK_ALPHA,
      box_thickness: BOX_THICKNESS,
    }
  }
}

impl DrawConfig {
  pub fn with_show_score(mut self, show_score: bool) -> Self {
    self.show_score = show_score;
    self
  }

  pub fn with_masks(mut self, draw_masks: bool) -> Self {
    self.draw_masks = draw_masks;
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }
}

/// 标注渲染器
///
/// 在输入位图的副本上按检测顺序绘制掩码、边框与标签，后绘制的覆盖先绘制的。
pub struct Draw {
  font: FontArc,
  config: DrawConfig,
  colors: Vec<Rgb<u8>>,
}

impl Draw {
  pub fn new(config: DrawConfig) -> Result<Self, RenderError> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).map_err(|_| RenderError::Font)?;
    Ok(Self::with_font(font, config))
  }

  pub fn with_font(font: FontArc, config: DrawConfig) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        Self::hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      config,
      colors,
    }
  }

  pub fn config(&self) -> &DrawConfig {
    &self.config
  }

  /// 类别对应的颜色（RGB 顺序）
  pub fn color_for(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// HSV 转 RGB
  fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
      (c, x, 0.0)
    } else if h < 120.0 {
      (x, c, 0.0)
    } else if h < 180.0 {
      (0.0, c, x)
    } else if h < 240.0 {
      (0.0, x, c)
    } else if h < 300.0 {
      (x, 0.0, c)
    } else {
      (c, 0.0, x)
    };

    Rgb([
      ((r + m) * 255.0) as u8,
      ((g + m) * 255.0) as u8,
      ((b + m) * 255.0) as u8,
    ])
  }

  /// 生成标注图像，输出总是 RGB 顺序，输入位图保持不变
  pub fn render(
    &self,
    bitmap: &Bitmap,
    result: &DetectResult,
    catalog: &ClassCatalog,
  ) -> Result<Bitmap, RenderError> {
    // 绘制原语工作在 RGB 图像上，BGR 输入在这里显式转换
    let mut canvas = bitmap.to_rgb_image();
    if result.is_empty() {
      debug!("没有检测结果，返回原图副本");
      return Ok(Bitmap::from_rgb_image(canvas));
    }

    for (index, item) in result.iter().enumerate() {
      let name = catalog
        .get(item.class_id)
        .ok_or(RenderError::UnknownClass(item.class_id))?;
      let color = self.color_for(item.class_id);
      validate_bbox(index, &item.bbox)?;

      if let Some(mask) = &item.mask {
        if mask.dimensions() != canvas.dimensions() {
          return Err(RenderError::MaskSize {
            index,
            expected: canvas.dimensions(),
            actual: mask.dimensions(),
          });
        }
        if self.config.draw_masks {
          self.blend_mask(&mut canvas, mask, color);
        }
      }

      let label = self.label_text(name, item);
      self.draw_bbox_with_label(&mut canvas, &item.bbox, &label, color);
    }

    Ok(Bitmap::from_rgb_image(canvas))
  }

  fn label_text(&self, name: &str, item: &DetectItem) -> String {
    if self.config.show_score {
      format!("{} {:.2}", name, item.score)
    } else {
      name.to_string()
    }
  }

  fn blend_mask(&self, image: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    let alpha = self.config.mask_alpha.clamp(0.0, 1.0);
    for (x, y, m) in mask.enumerate_pixels() {
      if m.0[0] == 0 {
        continue;
      }
      let pixel = image.get_pixel_mut(x, y);
      for c in 0..3 {
        let blended = pixel.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha;
        pixel.0[c] = blended.round() as u8;
      }
    }
  }

  // 在图像上绘制一个矩形边框与标签，bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    label: &str,
    color: Rgb<u8>,
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = bbox[0].floor() as i32;
    let y_min = bbox[1].floor() as i32;
    let x_max = bbox[2].ceil() as i32;
    let y_max = bbox[3].ceil() as i32;

    if x_max < 0 || y_max < 0 || x_min >= w || y_min >= h {
      debug!("检测框 {:?} 位于图像之外，跳过", bbox);
      return;
    }

    // Clamp to image bounds
    let x_min = x_min.clamp(0, w - 1);
    let y_min = y_min.clamp(0, h - 1);
    let x_max = x_max.clamp(0, w - 1);
    let y_max = y_max.clamp(0, h - 1);

    // 绘制边框（向内加粗）
    for t in 0..self.config.box_thickness as i32 {
      let (x0, y0, x1, y1) = (x_min + t, y_min + t, x_max - t, y_max - t);
      if x0 > x1 || y0 > y1 {
        break;
      }
      let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 文本参数
    let scale = PxScale::from(self.config.font_size);
    let (text_width, text_height) = text_size(scale, &self.font, label);
    let label_width = text_width + 2 * LABEL_TEXT_HORIZONTAL_PADDING;
    let label_height = text_height + 2 * LABEL_TEXT_VERTICAL_PADDING as u32;

    // 标签放在边框上方，空间不足时贴着图像上沿
    let label_x = x_min.min((w - label_width as i32).max(0));
    let label_y = (y_min - label_height as i32).max(0);

    let max_width = (w - label_x).max(0) as u32;
    let label_width = label_width.min(max_width);
    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      LABEL_TEXT_COLOR,
      label_x + LABEL_TEXT_HORIZONTAL_PADDING as i32,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      &self.font,
      label,
    );
  }
}

fn validate_bbox(index: usize, bbox: &[f32; 4]) -> Result<(), RenderError> {
  let finite = bbox.iter().all(|v| v.is_finite());
  if !finite || bbox[0] > bbox[2] || bbox[1] > bbox[3] {
    return Err(RenderError::InvalidGeometry { index, bbox: *bbox });
  }
  Ok(())
}
