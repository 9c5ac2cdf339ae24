// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input.rs - 上传图像输入
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

use std::path::Path;
use std::sync::Arc;

mod normalize;
pub use self::normalize::{DecodeError, ImageNormalizer, SUPPORTED_EXTENSIONS};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 一次请求中上传的原始字节及其声明的扩展名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpload {
  bytes: Arc<[u8]>,
  extension: Option<String>,
}

impl RawUpload {
  pub fn new(bytes: impl Into<Arc<[u8]>>, extension: Option<&str>) -> Self {
    Self {
      bytes: bytes.into(),
      extension: extension.map(|ext| ext.trim_start_matches('.').to_ascii_lowercase()),
    }
  }

  /// 按文件名推断扩展名，取最后一个 `.` 之后的部分
  pub fn with_file_name(bytes: impl Into<Arc<[u8]>>, file_name: &str) -> Self {
    let extension = Path::new(file_name)
      .extension()
      .and_then(|ext| ext.to_str());
    Self::new(bytes, extension)
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn extension(&self) -> Option<&str> {
    self.extension.as_deref()
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }
}
