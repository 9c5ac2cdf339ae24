// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/catalog.rs - 类别表
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

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别索引无效: {0}")]
  InvalidIndex(String),
  #[error("类别 {0} 的名称必须是字符串")]
  InvalidName(String),
  #[error("类别表必须是对象或数组")]
  InvalidShape,
  #[error("类别索引 {0} 重复")]
  DuplicateIndex(u32),
  #[error("类别名称 {0} 重复")]
  DuplicateName(String),
}

/// 类别索引到名称的一一映射，进程启动时加载一次
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCatalog {
  names: BTreeMap<u32, String>,
}

impl ClassCatalog {
  /// 索引与名称都不允许重复，否则标签数与检测数的对应关系会被破坏
  pub fn from_entries<I, S>(entries: I) -> Result<Self, CatalogError>
  where
    I: IntoIterator<Item = (u32, S)>,
    S: Into<String>,
  {
    let mut names = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for (idx, name) in entries {
      let name = name.into();
      if !seen.insert(name.clone()) {
        return Err(CatalogError::DuplicateName(name));
      }
      if names.insert(idx, name).is_some() {
        return Err(CatalogError::DuplicateIndex(idx));
      }
    }
    Ok(Self { names })
  }

  /// 按位置编号
  pub fn from_names<I, S>(names: I) -> Result<Self, CatalogError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::from_entries(
      names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (idx as u32, name)),
    )
  }

  /// 支持 `{"0": "plastic"}` 与 `["plastic", ...]` 两种写法
  pub fn from_json(data: &[u8]) -> Result<Self, CatalogError> {
    match serde_json::from_slice::<Value>(data)? {
      Value::Array(items) => items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
          Value::String(name) => Ok((idx as u32, name)),
          _ => Err(CatalogError::InvalidName(idx.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(Self::from_entries),
      Value::Object(map) => map
        .into_iter()
        .map(|(key, item)| {
          let idx = key
            .trim()
            .parse::<u32>()
            .map_err(|_| CatalogError::InvalidIndex(key.clone()))?;
          match item {
            Value::String(name) => Ok((idx, name)),
            _ => Err(CatalogError::InvalidName(key)),
          }
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(Self::from_entries),
      _ => Err(CatalogError::InvalidShape),
    }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    let catalog = Self::from_json(&std::fs::read(path)?)?;
    debug!("从 {} 加载 {} 个类别", path.display(), catalog.len());
    Ok(catalog)
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  pub fn contains(&self, class_id: u32) -> bool {
    self.names.contains_key(&class_id)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    self.names.iter().map(|(id, name)| (*id, name.as_str()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_object_form() {
    let catalog = ClassCatalog::from_json(br#"{"2": "plastic", "5": "paper"}"#).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get(2), Some("plastic"));
    assert_eq!(catalog.get(5), Some("paper"));
    assert_eq!(catalog.get(0), None);
  }

  #[test]
  fn parses_array_form() {
    let catalog = ClassCatalog::from_json(br#"["cardboard", "glass", "metal"]"#).unwrap();
    assert_eq!(catalog, ClassCatalog::from_names(["cardboard", "glass", "metal"]).unwrap());
    assert_eq!(
      catalog.iter().collect::<Vec<_>>(),
      vec![(0, "cardboard"), (1, "glass"), (2, "metal")]
    );
  }

  #[test]
  fn rejects_bad_entries() {
    assert!(matches!(
      ClassCatalog::from_json(br#"{"two": "plastic"}"#),
      Err(CatalogError::InvalidIndex(key)) if key == "two"
    ));
    assert!(matches!(
      ClassCatalog::from_json(br#"["plastic", 3]"#),
      Err(CatalogError::InvalidName(key)) if key == "1"
    ));
    assert!(matches!(
      ClassCatalog::from_json(b"42"),
      Err(CatalogError::InvalidShape)
    ));
    assert!(matches!(
      ClassCatalog::from_json(b"{"),
      Err(CatalogError::JsonError(_))
    ));
  }

  #[test]
  fn rejects_duplicates() {
    assert!(matches!(
      ClassCatalog::from_json(br#"{"0": "plastic", "1": "plastic"}"#),
      Err(CatalogError::DuplicateName(name)) if name == "plastic"
    ));
    assert!(matches!(
      ClassCatalog::from_json(br#"["paper", "glass", "paper"]"#),
      Err(CatalogError::DuplicateName(name)) if name == "paper"
    ));
    assert!(matches!(
      ClassCatalog::from_json(br#"{"2": "plastic", " 2": "paper"}"#),
      Err(CatalogError::DuplicateIndex(2))
    ));
    assert!(matches!(
      ClassCatalog::from_entries([(0, "metal"), (7, "metal")]),
      Err(CatalogError::DuplicateName(_))
    ));
  }

  #[test]
  fn distinct_ids_give_one_label_each() {
    use crate::labels::extract_labels;
    use crate::model::{DetectItem, DetectResult};

    let catalog = ClassCatalog::from_json(br#"{"0": "plastic", "1": "paper"}"#).unwrap();
    let result = DetectResult::from(vec![
      DetectItem::new(0, 0.9, [0.0, 0.0, 1.0, 1.0]),
      DetectItem::new(1, 0.8, [0.0, 0.0, 1.0, 1.0]),
    ]);
    assert_eq!(extract_labels(&result, &catalog).unwrap().len(), result.len());
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.json");
    std::fs::write(&path, r#"{"0": "biodegradable"}"#).unwrap();
    let catalog = ClassCatalog::load(&path).unwrap();
    assert_eq!(catalog.get(0), Some("biodegradable"));
  }
}
