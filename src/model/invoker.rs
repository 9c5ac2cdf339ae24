// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/invoker.rs - 推理调用
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

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{Bitmap, ChannelOrder},
  model::{DetectResult, Model},
};

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("输入尺寸无效: {width}x{height}")]
  InvalidInput { width: u32, height: u32 },
  #[error("推理后端错误: {0}")]
  Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
  #[error("推理锁已失效")]
  Poisoned,
}

/// 并发推理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferenceDiscipline {
  /// 模型可安全并发读取
  #[default]
  Concurrent,
  /// 同一时刻最多一个推理，其余排队
  Serialized,
}

pub struct InferenceInvoker<M> {
  model: Arc<M>,
  gate: Option<Mutex<()>>,
}

impl<M: Model> InferenceInvoker<M> {
  pub fn new(model: Arc<M>, discipline: InferenceDiscipline) -> Self {
    let gate = match discipline {
      InferenceDiscipline::Concurrent => None,
      InferenceDiscipline::Serialized => Some(Mutex::new(())),
    };
    Self { model, gate }
  }

  pub fn discipline(&self) -> InferenceDiscipline {
    if self.gate.is_some() {
      InferenceDiscipline::Serialized
    } else {
      InferenceDiscipline::Concurrent
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 单次推理，不重试
  pub fn infer(&self, bitmap: &Bitmap) -> Result<DetectResult, InferenceError> {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
      return Err(InferenceError::InvalidInput { width, height });
    }

    let input = match bitmap.order() {
      ChannelOrder::Rgb => Cow::Borrowed(bitmap),
      ChannelOrder::Bgr => {
        debug!("输入为 BGR 顺序，转换为 RGB");
        Cow::Owned(bitmap.to_order(ChannelOrder::Rgb))
      }
    };

    let _guard = match &self.gate {
      Some(gate) => Some(gate.lock().map_err(|_| InferenceError::Poisoned)?),
      None => None,
    };

    let now = std::time::Instant::now();
    let result = self
      .model
      .infer(&input)
      .map_err(|e| InferenceError::Backend(Box::new(e)))?;
    info!(
      "推理完成，耗时: {:.2?}，检测到 {} 个对象",
      now.elapsed(),
      result.len()
    );

    Ok(result)
  }
}
