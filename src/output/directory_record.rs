// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/directory_record.rs - 上传与标注结果目录存档
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
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::RawUpload,
  model::ClassCatalog,
  output::{EncodeFormat, Render, encode},
  pipeline::Processed,
};

const UPLOAD_DIR: &str = "uploaded_images";
const OUTPUT_DIR: &str = "output";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径编码错误: {0}")]
  PathEncoding(std::string::FromUtf8Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 一次存档写入的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPaths {
  pub id: Uuid,
  pub upload: PathBuf,
  pub annotated: PathBuf,
  pub record: Option<PathBuf>,
}

/// 以随机文件名保存上传图像、标注图像与检测记录
///
/// 目录布局：`<root>/uploaded_images/<id>.<ext>`、`<root>/output/<id>.png`、`<root>/output/<id>.json`。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  catalog: Option<Arc<ClassCatalog>>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let path = urlencoding::decode(uri.path()).map_err(DirectoryRecordOutputError::PathEncoding)?;
    let mut output = DirectoryRecordOutput::new(path.as_ref());
    for (key, value) in uri.query_pairs() {
      if key == "record" {
        output.record = !matches!(value.as_ref(), "false" | "0" | "no");
      }
    }

    Ok(output)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      record: true,
      catalog: None,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  /// 记录中附带每个检测的类别名称
  pub fn with_catalog(mut self, catalog: ClassCatalog) -> Self {
    self.catalog = Some(Arc::new(catalog));
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn store(
    &self,
    raw: &RawUpload,
    processed: &Processed,
  ) -> Result<StoredPaths, DirectoryRecordOutputError> {
    let id = Uuid::new_v4();
    let upload_dir = self.directory.join(UPLOAD_DIR);
    let output_dir = self.directory.join(OUTPUT_DIR);
    std::fs::create_dir_all(&upload_dir)?;
    std::fs::create_dir_all(&output_dir)?;

    let upload_format = raw
      .extension()
      .and_then(EncodeFormat::from_extension)
      .unwrap_or(EncodeFormat::Png);
    let upload = upload_dir.join(format!("{id}.{}", upload_format.extension()));
    std::fs::write(&upload, encode(&processed.original, upload_format)?)?;

    let annotated = output_dir.join(format!("{id}.png"));
    std::fs::write(&annotated, encode(&processed.annotated, EncodeFormat::Png)?)?;

    let record = if self.record {
      let path = output_dir.join(format!("{id}.json"));
      std::fs::write(&path, serde_json::to_vec_pretty(&self.record_json(id, processed))?)?;
      Some(path)
    } else {
      None
    };

    info!("保存结果到目录: {}", self.directory.display());

    Ok(StoredPaths {
      id,
      upload,
      annotated,
      record,
    })
  }

  fn record_json(&self, id: Uuid, processed: &Processed) -> serde_json::Value {
    let detections: Vec<_> = processed
      .detections
      .iter()
      .map(|item| {
        let label = self
          .catalog
          .as_ref()
          .and_then(|catalog| catalog.get(item.class_id));
        json!({
          "class_id": item.class_id,
          "label": label,
          "score": item.score,
          "bbox": item.bbox,
          "mask_area": item.mask.as_ref().map(|m| m.pixels().filter(|p| p.0[0] > 0).count()),
        })
      })
      .collect();

    json!({
      "id": id.to_string(),
      "processed_at": Utc::now().to_rfc3339(),
      "width": processed.original.width(),
      "height": processed.original.height(),
      "labels": processed.labels.to_vec(),
      "detections": detections,
    })
  }
}

impl Render<RawUpload, Processed> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RawUpload, result: &Processed) -> Result<(), Self::Error> {
    self.store(frame, result).map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{Bitmap, ChannelOrder},
    labels::extract_labels,
    model::{DetectItem, DetectResult},
  };

  fn processed(catalog: &ClassCatalog) -> Processed {
    let original = Bitmap::new(4, 4, ChannelOrder::Rgb, vec![200; 48]).unwrap();
    let detections = DetectResult::from(vec![
      DetectItem::new(2, 0.9, [0.0, 0.0, 2.0, 2.0]),
      DetectItem::new(5, 0.6, [1.0, 1.0, 3.0, 3.0]),
    ]);
    let labels = extract_labels(&detections, catalog).unwrap();
    Processed {
      annotated: original.clone(),
      original,
      labels,
      detections,
    }
  }

  #[test]
  fn parses_folder_url() {
    let url = url::Url::parse("folder:///tmp/predicts%20a").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/tmp/predicts a"));
    assert!(output.record);

    let url = url::Url::parse("folder:///tmp/predicts?record=false").unwrap();
    assert!(!DirectoryRecordOutput::from_url(&url).unwrap().record);

    let url = url::Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn stores_upload_annotated_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ClassCatalog::from_entries([(2, "plastic"), (5, "paper")]).unwrap();
    let output = DirectoryRecordOutput::new(dir.path()).with_catalog(catalog.clone());

    let raw = RawUpload::with_file_name(vec![0u8; 1], "photo.JPEG");
    let stored = output.store(&raw, &processed(&catalog)).unwrap();

    assert_eq!(stored.upload, dir.path().join(UPLOAD_DIR).join(format!("{}.jpg", stored.id)));
    assert_eq!(stored.annotated, dir.path().join(OUTPUT_DIR).join(format!("{}.png", stored.id)));
    let annotated = image::open(&stored.annotated).unwrap().into_rgb8();
    assert_eq!(annotated.dimensions(), (4, 4));
    assert!(stored.upload.exists());

    let record: serde_json::Value =
      serde_json::from_slice(&std::fs::read(stored.record.unwrap()).unwrap()).unwrap();
    assert_eq!(record["labels"], json!(["paper", "plastic"]));
    assert_eq!(record["detections"][0]["label"], json!("plastic"));
    assert_eq!(record["detections"][1]["class_id"], json!(5));
    assert_eq!(record["id"], json!(stored.id.to_string()));
  }

  #[test]
  fn each_store_gets_fresh_name() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ClassCatalog::from_entries([(2, "plastic"), (5, "paper")]).unwrap();
    let output = DirectoryRecordOutput::new(dir.path()).with_record(false);
    let raw = RawUpload::new(vec![0u8; 1], None);
    let result = processed(&catalog);

    let first = output.store(&raw, &result).unwrap();
    output.render_result(&raw, &result).unwrap();
    assert!(first.record.is_none());
    assert!(first.upload.extension().is_some_and(|ext| ext == "png"));
    let count = std::fs::read_dir(dir.path().join(OUTPUT_DIR)).unwrap().count();
    assert_eq!(count, 2);
  }
}
