// 该文件是 Kuangtu （框图） 项目的一部分。
// src/node/message.rs - 消息字段选择
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

use std::fmt;

use serde_json::Value;

const PAYLOAD_FIELD: &str = "payload";

/// 从消息中取输入数据的位置，路径用 `.` 分隔，数组用数字下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
  /// 相对于整条消息，例如 `image` 对应 `msg.image`
  FromMessageField(String),
  /// 相对于 `msg.payload`，空路径表示 payload 本身
  FromPayloadField(String),
}

impl FieldSelector {
  pub fn message(path: impl Into<String>) -> Self {
    FieldSelector::FromMessageField(path.into())
  }

  pub fn payload(path: impl Into<String>) -> Self {
    FieldSelector::FromPayloadField(path.into())
  }

  /// 解析宿主配置中的属性路径：`payload.image` 相对于 payload，`msg.image` 或 `image` 相对于消息
  pub fn parse(path: &str) -> Self {
    let path = path.trim();
    let path = path.strip_prefix("msg.").unwrap_or(path);
    if path == PAYLOAD_FIELD {
      return FieldSelector::payload("");
    }
    match path.strip_prefix("payload.") {
      Some(rest) => FieldSelector::payload(rest),
      None => FieldSelector::message(path),
    }
  }

  pub fn select<'a>(&self, message: &'a Value) -> Option<&'a Value> {
    let (root, path) = match self {
      FieldSelector::FromMessageField(path) => (message, path),
      FieldSelector::FromPayloadField(path) => (message.get(PAYLOAD_FIELD)?, path),
    };

    path
      .split('.')
      .filter(|segment| !segment.is_empty())
      .try_fold(root, |value, segment| match value {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => value.get(segment),
      })
  }
}

impl fmt::Display for FieldSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FieldSelector::FromMessageField(path) => write!(f, "msg.{}", path),
      FieldSelector::FromPayloadField(path) if path.is_empty() => write!(f, "msg.payload"),
      FieldSelector::FromPayloadField(path) => write!(f, "msg.payload.{}", path),
    }
  }
}
