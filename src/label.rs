// 该文件是 Kuangtu （框图） 项目的一部分。
// src/label.rs - 类别名称表
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

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 类别编号到类别名称的查询
pub trait LabelLookup {
  fn lookup(&self, class_index: usize) -> String;
}

impl<F: Fn(usize) -> String> LabelLookup for F {
  fn lookup(&self, class_index: usize) -> String {
    self(class_index)
  }
}

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("无效的 URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("无法转换为文件路径: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别表格式错误: {0}")]
  InvalidTable(String),
}

/// 类别名称表
///
/// 没有表或表中缺少某个编号时，名称就是十进制的类别编号。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClassNames {
  #[default]
  Index,
  Table(HashMap<usize, String>),
}

impl ClassNames {
  /// 解析 JSON 类别表，支持 `{"0": "person"}` 对象和 `["person"]` 数组两种写法
  pub fn from_json_str(text: &str) -> Result<Self, LabelError> {
    let value: Value = serde_json::from_str(text)?;
    Self::from_value(&value)
  }

  pub fn from_value(value: &Value) -> Result<Self, LabelError> {
    let table = match value {
      Value::Array(items) => items
        .iter()
        .enumerate()
        .map(|(idx, item)| (idx, label_text(item)))
        .collect(),
      Value::Object(entries) => entries
        .iter()
        .map(|(key, item)| {
          key
            .trim()
            .parse::<usize>()
            .map(|idx| (idx, label_text(item)))
            .map_err(|_| LabelError::InvalidTable(format!("类别编号 '{}' 不是非负整数", key)))
        })
        .collect::<Result<HashMap<_, _>, _>>()?,
      other => {
        return Err(LabelError::InvalidTable(format!(
          "期望对象或数组, 实际为 {}",
          other
        )));
      }
    };
    Ok(ClassNames::Table(table))
  }

  /// 按配置加载类别表；配置为空或加载失败时使用类别编号作为名称
  pub fn load_or_index(location: &str) -> Self {
    let location = location.trim();
    if location.is_empty() {
      return ClassNames::Index;
    }

    let loaded = Url::parse(location)
      .map_err(LabelError::from)
      .and_then(|url| ClassNames::from_url(&url));
    match loaded {
      Ok(names) => {
        info!("类别文件加载完成: {} ({} 个类别)", location, names.len());
        names
      }
      Err(e) => {
        warn!("无法加载类别文件 {}: {}, 使用类别编号作为名称", location, e);
        ClassNames::Index
      }
    }
  }

  pub fn len(&self) -> usize {
    match self {
      ClassNames::Index => 0,
      ClassNames::Table(table) => table.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn label_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

impl LabelLookup for ClassNames {
  fn lookup(&self, class_index: usize) -> String {
    match self {
      ClassNames::Index => class_index.to_string(),
      ClassNames::Table(table) => match table.get(&class_index) {
        Some(name) => name.clone(),
        None => {
          warn!("类别表中没有编号 {}", class_index);
          class_index.to_string()
        }
      },
    }
  }
}

impl FromUrlWithScheme for ClassNames {
  const SCHEME: &'static str = "file";
}

impl FromUrl for ClassNames {
  type Error = LabelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LabelError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = url
      .to_file_path()
      .map_err(|_| LabelError::InvalidPath(url.to_string()))?;
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_names_are_decimal() {
    assert_eq!(ClassNames::Index.lookup(0), "0");
    assert_eq!(ClassNames::Index.lookup(17), "17");
  }

  #[test]
  fn object_and_array_tables() {
    let names = ClassNames::from_json_str(r#"{"0": "person", "2": "car"}"#).unwrap();
    assert_eq!(names.lookup(0), "person");
    assert_eq!(names.lookup(2), "car");
    assert_eq!(names.lookup(1), "1");

    let names = ClassNames::from_json_str(r#"["person", "bicycle"]"#).unwrap();
    assert_eq!(names.lookup(1), "bicycle");
    assert_eq!(names.len(), 2);
  }

  #[test]
  fn bad_table_is_rejected() {
    assert!(matches!(
      ClassNames::from_json_str(r#"{"first": "person"}"#),
      Err(LabelError::InvalidTable(_))
    ));
    assert!(matches!(
      ClassNames::from_json_str("42"),
      Err(LabelError::InvalidTable(_))
    ));
  }

  #[test]
  fn closures_are_lookups() {
    let upper = |idx: usize| format!("C{}", idx);
    assert_eq!(upper.lookup(3), "C3");
  }

  #[test]
  fn loads_from_file_url() {
    let path = std::env::temp_dir().join(format!("kuangtu-labels-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"1": "cat"}"#).unwrap();
    let url = Url::from_file_path(&path).unwrap();

    let names = ClassNames::load_or_index(url.as_str());
    assert_eq!(names.lookup(1), "cat");

    std::fs::remove_file(&path).unwrap();
  }

  #[test]
  fn unsupported_or_missing_sources_fall_back() {
    assert_eq!(ClassNames::load_or_index(""), ClassNames::Index);
    assert_eq!(ClassNames::load_or_index("not a url"), ClassNames::Index);
    assert_eq!(
      ClassNames::load_or_index("https://example.com/classes.json"),
      ClassNames::Index
    );
    assert_eq!(
      ClassNames::load_or_index("file:///definitely/not/here.json"),
      ClassNames::Index
    );
  }
}
