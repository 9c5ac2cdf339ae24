// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::RawUpload};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid path encoding: {0}")]
  PathEncoding(std::string::FromUtf8Error),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 从本地文件读取一次上传，用于命令行调用方
pub struct ImageFileInput {
  path: PathBuf,
  upload: Option<RawUpload>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = urlencoding::decode(url.path()).map_err(ImageFileInputError::PathEncoding)?;
    let path = PathBuf::from(path.as_ref());
    let bytes = std::fs::read(&path)?;
    let file_name = path
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or_default();

    Ok(ImageFileInput {
      upload: Some(RawUpload::with_file_name(bytes, file_name)),
      path,
    })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &std::path::Path {
    &self.path
  }
}

impl Iterator for ImageFileInput {
  type Item = RawUpload;

  fn next(&mut self) -> Option<Self::Item> {
    self.upload.take()
  }
}
