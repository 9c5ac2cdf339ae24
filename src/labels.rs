// 该文件是 Fenjian （分拣） 项目的一部分。
// src/labels.rs - 检测类别标签提取
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

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::model::{ClassCatalog, DetectResult};

/// 检测结果引用了类别表中不存在的索引，说明模型与类别表版本不一致
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("类别索引 {class_id} 不在类别表中")]
pub struct CatalogMismatchError {
  pub class_id: u32,
}

/// 去重后的标签集合，按字典序排列
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
  labels: BTreeSet<String>,
}

impl LabelSet {
  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn contains(&self, label: &str) -> bool {
    self.labels.contains(label)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }

  pub fn to_vec(&self) -> Vec<String> {
    self.labels.iter().cloned().collect()
  }
}

impl fmt::Display for LabelSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, label) in self.labels.iter().enumerate() {
      if idx > 0 {
        f.write_str(", ")?;
      }
      f.write_str(label)?;
    }
    Ok(())
  }
}

impl<'a> IntoIterator for &'a LabelSet {
  type Item = &'a String;
  type IntoIter = std::collections::btree_set::Iter<'a, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.labels.iter()
  }
}

/// 将检测结果映射为标签集合，与检测顺序无关
pub fn extract_labels(
  result: &DetectResult,
  catalog: &ClassCatalog,
) -> Result<LabelSet, CatalogMismatchError> {
  let labels = result
    .iter()
    .map(|item| {
      catalog
        .get(item.class_id)
        .map(str::to_string)
        .ok_or(CatalogMismatchError {
          class_id: item.class_id,
        })
    })
    .collect::<Result<BTreeSet<_>, _>>()?;

  Ok(LabelSet { labels })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn catalog() -> ClassCatalog {
    ClassCatalog::from_entries([(2, "plastic"), (5, "paper")]).unwrap()
  }

  fn result(ids: &[u32]) -> DetectResult {
    ids
      .iter()
      .enumerate()
      .map(|(i, id)| DetectItem::new(*id, 0.9, [i as f32, 0.0, i as f32 + 1.0, 1.0]))
      .collect::<Vec<_>>()
      .into()
  }

  #[test]
  fn same_class_is_deduplicated() {
    let labels = extract_labels(&result(&[2, 2]), &catalog()).unwrap();
    assert_eq!(labels.to_vec(), vec!["plastic"]);
  }

  #[test]
  fn labels_are_lexicographic() {
    let labels = extract_labels(&result(&[5, 2]), &catalog()).unwrap();
    assert_eq!(labels.to_vec(), vec!["paper", "plastic"]);
    assert_eq!(labels.to_string(), "paper, plastic");
  }

  #[test]
  fn order_invariant() {
    let a = extract_labels(&result(&[2, 5, 2]), &catalog()).unwrap();
    let b = extract_labels(&result(&[2, 2, 5]), &catalog()).unwrap();
    let c = extract_labels(&result(&[5, 2, 2]), &catalog()).unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
  }

  #[test]
  fn size_bounded_by_detections() {
    let cases: [&[u32]; 5] = [&[], &[2], &[2, 5], &[2, 2, 5], &[5, 5, 5]];
    for ids in cases {
      let labels = extract_labels(&result(ids), &catalog()).unwrap();
      let distinct: BTreeSet<_> = ids.iter().collect();
      assert!(labels.len() <= ids.len());
      assert_eq!(labels.len() == ids.len(), distinct.len() == ids.len());
    }
  }

  #[test]
  fn empty_result_is_empty_set() {
    let labels = extract_labels(&DetectResult::empty(), &catalog()).unwrap();
    assert!(labels.is_empty());
    assert_eq!(labels.to_string(), "");
  }

  #[test]
  fn unknown_class_is_surfaced() {
    let err = extract_labels(&result(&[2, 7]), &catalog()).unwrap_err();
    assert_eq!(err, CatalogMismatchError { class_id: 7 });
  }
}
