// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/yolov8_seg.rs - YOLOv8 分割模型
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use tract_onnx::prelude::{
  Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Bitmap,
  model::{
    CatalogError, ClassCatalog, DetectResult, InferenceDiscipline, Model,
    postprocess::{self, PostprocessConfig, PostprocessError, Predictions, Prototypes},
    preprocess,
  },
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_SEG_SCHEME: &str = "yolov8seg";

#[derive(Error, Debug)]
pub enum Yolov8SegError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型参数错误: {0}={1}")]
  InvalidParameter(String, String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("类别表错误: {0}")]
  CatalogError(#[from] CatalogError),
  #[error("模型执行错误: {0}")]
  RunError(String),
  #[error("模型输出形状不符: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("后处理错误: {0}")]
  PostprocessError(#[from] PostprocessError),
}

pub struct Yolov8SegBuilder {
  model_path: PathBuf,
  labels_path: Option<PathBuf>,
  input_size: u32,
  config: PostprocessConfig,
  discipline: InferenceDiscipline,
}

impl FromUrlWithScheme for Yolov8SegBuilder {
  const SCHEME: &'static str = YOLOV8_SEG_SCHEME;
}

impl FromUrl for Yolov8SegBuilder {
  type Error = Yolov8SegError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8SegError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = Yolov8SegBuilder::new(decode_path(url.path())?);
    for (key, value) in url.query_pairs() {
      let invalid = || Yolov8SegError::InvalidParameter(key.to_string(), value.to_string());
      builder = match key.as_ref() {
        "labels" => builder.labels(value.to_string()),
        "conf" => builder.conf_threshold(value.parse().map_err(|_| invalid())?),
        "iou" => builder.iou_threshold(value.parse().map_err(|_| invalid())?),
        "max_det" => builder.max_det(value.parse().map_err(|_| invalid())?),
        "imgsz" => builder.input_size(value.parse().map_err(|_| invalid())?),
        "serialize" => builder.discipline(InferenceDiscipline::Serialized),
        _ => {
          warn!("忽略未知的模型参数: {}={}", key, value);
          builder
        }
      };
    }

    Ok(builder)
  }
}

fn decode_path(path: &str) -> Result<PathBuf, Yolov8SegError> {
  urlencoding::decode(path)
    .map(|p| PathBuf::from(p.as_ref()))
    .map_err(|e| Yolov8SegError::ModelPathError(e.to_string()))
}

impl Yolov8SegBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      labels_path: None,
      input_size: YOLOV8_INPUT_SIZE,
      config: PostprocessConfig::default(),
      discipline: InferenceDiscipline::Concurrent,
    }
  }

  pub fn labels(mut self, path: impl Into<PathBuf>) -> Self {
    self.labels_path = Some(path.into());
    self
  }

  pub fn conf_threshold(mut self, threshold: f32) -> Self {
    self.config.conf_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.config.iou_threshold = threshold;
    self
  }

  pub fn max_det(mut self, max_det: usize) -> Self {
    self.config.max_det = max_det;
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn discipline(mut self, discipline: InferenceDiscipline) -> Self {
    self.discipline = discipline;
    self
  }

  /// 未指定类别表时，使用与模型同名的 `.json` 文件
  pub fn labels_path(&self) -> PathBuf {
    self
      .labels_path
      .clone()
      .unwrap_or_else(|| self.model_path.with_extension("json"))
  }

  pub fn build(self) -> Result<Yolov8Seg, Yolov8SegError> {
    if self.input_size == 0 || self.input_size % 32 != 0 {
      return Err(Yolov8SegError::InvalidParameter(
        "imgsz".to_string(),
        self.input_size.to_string(),
      ));
    }

    let labels_path = self.labels_path();
    info!("加载类别表: {}", labels_path.display());
    let catalog = ClassCatalog::load(&labels_path)?;

    info!("加载模型文件: {}", self.model_path.display());
    let runnable = load_runnable_model(&self.model_path)?;
    info!(
      "模型加载完成，输入尺寸 {}x{}，类别数 {}",
      self.input_size,
      self.input_size,
      catalog.len()
    );

    Ok(Yolov8Seg {
      runnable,
      catalog,
      input_size: self.input_size,
      config: self.config,
      discipline: self.discipline,
    })
  }
}

fn load_runnable_model(path: &Path) -> Result<RunnableModel, Yolov8SegError> {
  if !path.exists() {
    return Err(Yolov8SegError::ModelPathError(format!(
      "模型文件不存在: {}",
      path.display()
    )));
  }

  tract_onnx::onnx()
    .model_for_path(path)
    .map_err(|e| Yolov8SegError::ModelLoadError(format!("无法解析 ONNX 图: {e}")))?
    .into_optimized()
    .map_err(|e| Yolov8SegError::ModelLoadError(format!("无法优化模型: {e}")))?
    .into_runnable()
    .map_err(|e| Yolov8SegError::ModelLoadError(format!("无法生成可执行模型: {e}")))
}

pub struct Yolov8Seg {
  runnable: RunnableModel,
  catalog: ClassCatalog,
  input_size: u32,
  config: PostprocessConfig,
  discipline: InferenceDiscipline,
}

impl Yolov8Seg {
  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn config(&self) -> &PostprocessConfig {
    &self.config
  }
}

impl Model for Yolov8Seg {
  type Error = Yolov8SegError;

  fn infer(&self, input: &Bitmap) -> Result<DetectResult, Self::Error> {
    let size = self.input_size;
    let (data, letterbox) = preprocess::letterbox(input, (size, size));
    debug!(
      "预处理完成: 缩放 {:.4}，填充 ({}, {})",
      letterbox.scale, letterbox.pad_x, letterbox.pad_y
    );

    let tensor = Tensor::from_shape(&[1, 3, size as usize, size as usize], data.as_slice())
      .map_err(|e| Yolov8SegError::RunError(e.to_string()))?;

    debug!("执行模型推理");
    let outputs: Vec<Tensor> = self
      .runnable
      .run(tvec![tensor.into()])
      .map_err(|e| Yolov8SegError::RunError(e.to_string()))?
      .into_iter()
      .map(|value| value.into_tensor())
      .collect();

    let pred = outputs
      .first()
      .ok_or_else(|| Yolov8SegError::OutputShape(Vec::new()))?;
    let pred_data = pred
      .as_slice::<f32>()
      .map_err(|e| Yolov8SegError::RunError(e.to_string()))?;
    let proto = match outputs.get(1) {
      Some(proto) => Some((
        proto.shape(),
        proto
          .as_slice::<f32>()
          .map_err(|e| Yolov8SegError::RunError(e.to_string()))?,
      )),
      None => None,
    };
    let (predictions, prototypes) = split_outputs(pred.shape(), pred_data, proto)?;

    let items = postprocess::decode(predictions, prototypes, &letterbox, &self.config)?;
    debug!("检测到 {} 个物体", items.len());
    Ok(items.into())
  }

  fn class_catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  fn discipline(&self) -> InferenceDiscipline {
    self.discipline
  }
}

/// 按 `[1, C, N]` 与可选的 `[1, nm, mh, mw]` 形状解释模型输出
fn split_outputs<'a>(
  pred_shape: &[usize],
  pred_data: &'a [f32],
  proto: Option<(&[usize], &'a [f32])>,
) -> Result<(Predictions<'a>, Option<Prototypes<'a>>), Yolov8SegError> {
  let (channels, anchors) = match pred_shape {
    [1, channels, anchors] => (*channels, *anchors),
    other => return Err(Yolov8SegError::OutputShape(other.to_vec())),
  };
  let predictions = Predictions::new(pred_data, channels, anchors)?;

  let prototypes = match proto {
    Some((shape, data)) => {
      let (count, height, width) = match shape {
        [1, count, height, width] => (*count, *height, *width),
        other => return Err(Yolov8SegError::OutputShape(other.to_vec())),
      };
      Some(Prototypes::new(data, count, height, width)?)
    }
    None => {
      debug!("模型只有检测输出，不生成掩码");
      None
    }
  };

  Ok((predictions, prototypes))
}
