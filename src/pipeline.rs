// 该文件是 Fenjian （分拣） 项目的一部分。
// src/pipeline.rs - 单张图像处理流程
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

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::Bitmap,
  input::{DecodeError, ImageNormalizer, RawUpload},
  labels::{CatalogMismatchError, LabelSet, extract_labels},
  model::{ClassCatalog, DetectResult, InferenceDiscipline, InferenceError, InferenceInvoker, Model},
  output::{Draw, DrawConfig, RenderError},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
  #[error("类别表不匹配: {0}")]
  CatalogMismatch(#[from] CatalogMismatchError),
  #[error("渲染错误: {0}")]
  Render(#[from] RenderError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  parallel_stages: bool,
  discipline: Option<InferenceDiscipline>,
  normalizer: ImageNormalizer,
  draw: DrawConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      parallel_stages: true,
      discipline: None,
      normalizer: ImageNormalizer::default(),
      draw: DrawConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// 标签提取与渲染是否并行执行
  pub fn with_parallel_stages(mut self, parallel: bool) -> Self {
    self.parallel_stages = parallel;
    self
  }

  /// 覆盖模型声明的并发策略
  pub fn with_discipline(mut self, discipline: InferenceDiscipline) -> Self {
    self.discipline = Some(discipline);
    self
  }

  pub fn with_normalizer(mut self, normalizer: ImageNormalizer) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn with_draw(mut self, draw: DrawConfig) -> Self {
    self.draw = draw;
    self
  }
}

/// 进程级只读状态：模型与类别表，启动时构造一次
pub struct PipelineContext<M> {
  model: Arc<M>,
  catalog: Arc<ClassCatalog>,
}

impl<M: Model> PipelineContext<M> {
  pub fn new(model: M) -> Self {
    Self::from_shared(Arc::new(model))
  }

  pub fn from_shared(model: Arc<M>) -> Self {
    let catalog = Arc::new(model.class_catalog().clone());
    info!("类别表已加载: {} 个类别", catalog.len());
    Self { model, catalog }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }
}

/// 一次处理的全部结果
#[derive(Debug, Clone)]
pub struct Processed {
  pub original: Bitmap,
  pub annotated: Bitmap,
  pub labels: LabelSet,
  pub detections: DetectResult,
}

struct Inner<M> {
  normalizer: ImageNormalizer,
  invoker: InferenceInvoker<M>,
  catalog: Arc<ClassCatalog>,
  draw: Draw,
  parallel_stages: bool,
}

/// 解码 → 推理 → (标签提取 ∥ 渲染)
pub struct Pipeline<M> {
  inner: Arc<Inner<M>>,
}

impl<M> Clone for Pipeline<M> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<M: Model> Pipeline<M> {
  pub fn new(context: PipelineContext<M>, config: PipelineConfig) -> Result<Self, RenderError> {
    let discipline = config
      .discipline
      .unwrap_or_else(|| context.model.discipline());
    info!("推理并发策略: {:?}", discipline);

    let draw = Draw::new(config.draw)?;
    Ok(Self {
      inner: Arc::new(Inner {
        normalizer: config.normalizer,
        invoker: InferenceInvoker::new(context.model, discipline),
        catalog: context.catalog,
        draw,
        parallel_stages: config.parallel_stages,
      }),
    })
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.inner.catalog
  }

  pub fn discipline(&self) -> InferenceDiscipline {
    self.inner.invoker.discipline()
  }

  pub fn process(&self, raw: &RawUpload) -> Result<Processed, PipelineError> {
    let inner = &*self.inner;
    let start = Instant::now();

    let original = inner.normalizer.normalize(raw)?;
    debug!(
      "解码完成: {}x{}，耗时: {:.2?}",
      original.width(),
      original.height(),
      start.elapsed()
    );

    let detections = inner.invoker.infer(&original)?;

    let (draw, catalog) = (&inner.draw, &*inner.catalog);
    let (labels, annotated) = if inner.parallel_stages {
      std::thread::scope(|s| {
        let render = s.spawn(|| draw.render(&original, &detections, catalog));
        let labels = extract_labels(&detections, catalog);
        let annotated = render
          .join()
          .unwrap_or(Err(RenderError::WorkerPanicked));
        (labels, annotated)
      })
    } else {
      (
        extract_labels(&detections, catalog),
        draw.render(&original, &detections, catalog),
      )
    };
    let labels = labels?;
    let annotated = annotated?;

    info!(
      "处理完成，耗时: {:.2?}，标签: [{}]",
      start.elapsed(),
      labels
    );

    Ok(Processed {
      original,
      annotated,
      labels,
      detections,
    })
  }
}
