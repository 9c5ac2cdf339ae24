// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/postprocess.rs - 分割模型输出后处理
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

//! 解码 `[1, 4 + nc + nm, N]` 预测张量与 `[1, nm, mh, mw]` 原型张量。
//!
//! 每一列为 `[cx, cy, w, h, class scores..., mask coefficients...]`，坐标位于模型输入空间。

use image::GrayImage;
use thiserror::Error;
use tracing::debug;

use crate::model::{DetectItem, preprocess::Letterbox};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PostprocessError {
  #[error("预测张量长度 {len} 与形状 {channels}x{anchors} 不符")]
  PredictionShape {
    len: usize,
    channels: usize,
    anchors: usize,
  },
  #[error("原型张量长度 {len} 与形状 {count}x{height}x{width} 不符")]
  PrototypeShape {
    len: usize,
    count: usize,
    height: usize,
    width: usize,
  },
  #[error("预测通道数 {channels} 不足以容纳 {mask_dim} 个掩码系数")]
  TooFewChannels { channels: usize, mask_dim: usize },
  #[error("原型张量为空: {count}x{height}x{width}")]
  EmptyPrototype {
    count: usize,
    height: usize,
    width: usize,
  },
}

#[derive(Debug, Clone)]
pub struct PostprocessConfig {
  pub conf_threshold: f32,
  pub iou_threshold: f32,
  pub max_det: usize,
  pub mask_threshold: f32,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self {
      conf_threshold: 0.25,
      iou_threshold: 0.7,
      max_det: 300,
      mask_threshold: 0.5,
    }
  }
}

/// `[channels, anchors]` 排列的预测
#[derive(Debug, Clone, Copy)]
pub struct Predictions<'a> {
  data: &'a [f32],
  channels: usize,
  anchors: usize,
}

impl<'a> Predictions<'a> {
  pub fn new(data: &'a [f32], channels: usize, anchors: usize) -> Result<Self, PostprocessError> {
    if data.len() != channels * anchors {
      return Err(PostprocessError::PredictionShape {
        len: data.len(),
        channels,
        anchors,
      });
    }
    Ok(Self {
      data,
      channels,
      anchors,
    })
  }

  fn at(&self, channel: usize, anchor: usize) -> f32 {
    self.data[channel * self.anchors + anchor]
  }
}

/// `[count, height, width]` 排列的掩码原型
#[derive(Debug, Clone, Copy)]
pub struct Prototypes<'a> {
  data: &'a [f32],
  count: usize,
  height: usize,
  width: usize,
}

impl<'a> Prototypes<'a> {
  pub fn new(
    data: &'a [f32],
    count: usize,
    height: usize,
    width: usize,
  ) -> Result<Self, PostprocessError> {
    if count == 0 || height == 0 || width == 0 {
      return Err(PostprocessError::EmptyPrototype {
        count,
        height,
        width,
      });
    }
    if data.len() != count * height * width {
      return Err(PostprocessError::PrototypeShape {
        len: data.len(),
        count,
        height,
        width,
      });
    }
    Ok(Self {
      data,
      count,
      height,
      width,
    })
  }
}

#[derive(Debug, Clone)]
struct Candidate {
  class_id: u32,
  score: f32,
  bbox: [f32; 4], // 模型输入空间
  coeffs: Vec<f32>,
}

pub fn decode(
  predictions: Predictions<'_>,
  prototypes: Option<Prototypes<'_>>,
  letterbox: &Letterbox,
  config: &PostprocessConfig,
) -> Result<Vec<DetectItem>, PostprocessError> {
  let mask_dim = prototypes.map(|p| p.count).unwrap_or(0);
  if predictions.channels <= 4 + mask_dim {
    return Err(PostprocessError::TooFewChannels {
      channels: predictions.channels,
      mask_dim,
    });
  }
  let num_classes = predictions.channels - 4 - mask_dim;

  let mut candidates = Vec::new();
  for anchor in 0..predictions.anchors {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c, predictions.at(4 + c, anchor)))
      .fold((0usize, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if !(score > config.conf_threshold) {
      continue;
    }

    let cx = predictions.at(0, anchor);
    let cy = predictions.at(1, anchor);
    let w = predictions.at(2, anchor);
    let h = predictions.at(3, anchor);
    let coeffs = (0..mask_dim)
      .map(|k| predictions.at(4 + num_classes + k, anchor))
      .collect();

    candidates.push(Candidate {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      coeffs,
    });
  }
  debug!("置信度过滤后剩余 {} 个候选", candidates.len());

  let kept = nms(candidates, config.iou_threshold, config.max_det);
  debug!("NMS 后剩余 {} 个目标", kept.len());

  let items = kept
    .into_iter()
    .map(|candidate| {
      let (x_min, y_min) = letterbox.to_source(candidate.bbox[0], candidate.bbox[1]);
      let (x_max, y_max) = letterbox.to_source(candidate.bbox[2], candidate.bbox[3]);
      let bbox = [x_min, y_min, x_max, y_max];
      let mask = prototypes.map(|protos| {
        process_mask(
          &protos,
          &candidate.coeffs,
          &bbox,
          letterbox,
          config.mask_threshold,
        )
      });
      DetectItem {
        class_id: candidate.class_id,
        score: candidate.score,
        bbox,
        mask,
      }
    })
    .collect();

  Ok(items)
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_det: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if result.len() >= max_det {
      break;
    }
    let suppressed = result.iter().any(|kept| {
      kept.class_id == candidate.class_id && iou(&kept.bbox, &candidate.bbox) > iou_threshold
    });
    if !suppressed {
      result.push(candidate);
    }
  }
  result
}

/// 计算两个 `[x_min, y_min, x_max, y_max]` 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 由掩码系数与原型生成原图尺寸的二值掩码，裁剪到目标框内
fn process_mask(
  protos: &Prototypes<'_>,
  coeffs: &[f32],
  bbox: &[f32; 4],
  letterbox: &Letterbox,
  threshold: f32,
) -> GrayImage {
  let (sw, sh) = letterbox.source_size;
  let (iw, ih) = letterbox.input_size;
  let ratio_x = protos.width as f32 / iw as f32;
  let ratio_y = protos.height as f32 / ih as f32;
  let plane = protos.width * protos.height;

  let x0 = bbox[0].floor().max(0.0) as u32;
  let y0 = bbox[1].floor().max(0.0) as u32;
  let x1 = (bbox[2].ceil() as u32).min(sw);
  let y1 = (bbox[3].ceil() as u32).min(sh);

  // 原型分辨率上的 logits 缓存，只计算被采样到的格子
  let mut cache: Vec<Option<f32>> = vec![None; plane];
  let mut logit_at = |px: usize, py: usize| -> f32 {
    let cell = py * protos.width + px;
    *cache[cell].get_or_insert_with(|| {
      coeffs
        .iter()
        .enumerate()
        .map(|(k, c)| c * protos.data[k * plane + cell])
        .sum()
    })
  };
  let max_x = (protos.width - 1) as f32;
  let max_y = (protos.height - 1) as f32;
  let mut mask = GrayImage::new(sw, sh);

  for y in y0..y1 {
    for x in x0..x1 {
      let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
      if cx < bbox[0] || cx > bbox[2] || cy < bbox[1] || cy > bbox[3] {
        continue;
      }

      // 双线性插值，格子中心位于 (i + 0.5)
      let (ix, iy) = letterbox.to_input(cx, cy);
      let fx = (ix * ratio_x - 0.5).clamp(0.0, max_x);
      let fy = (iy * ratio_y - 0.5).clamp(0.0, max_y);
      let (gx0, gy0) = (fx.floor() as usize, fy.floor() as usize);
      let (gx1, gy1) = ((gx0 + 1).min(protos.width - 1), (gy0 + 1).min(protos.height - 1));
      let (tx, ty) = (fx - gx0 as f32, fy - gy0 as f32);

      let top = logit_at(gx0, gy0) * (1.0 - tx) + logit_at(gx1, gy0) * tx;
      let bottom = logit_at(gx0, gy1) * (1.0 - tx) + logit_at(gx1, gy1) * tx;
      let logit = top * (1.0 - ty) + bottom * ty;

      if sigmoid(logit) > threshold {
        mask.put_pixel(x, y, image::Luma([255]));
      }
    }
  }

  mask
}
