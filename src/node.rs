// 该文件是 Kuangtu （框图） 项目的一部分。
// src/node.rs - 消息流节点
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

//! # 消息流节点
//!
//! 把后处理和绘制包装成收一条消息、回一条消息的节点。消息是任意 JSON，
//! 输入数据所在的字段由构造时绑定的 [`FieldSelector`] 决定，
//! 回复统一为 `{"payload": ...}`。
//!
//! 节点之间不共享状态，一个请求失败不会影响之后的请求。

use serde_json::Value;
use thiserror::Error;

use crate::model::DetectionError;
#[cfg(feature = "render")]
use crate::output::RenderError;

mod message;
mod post_object_detection;

#[cfg(feature = "render")]
mod bbox_image;

pub use self::message::FieldSelector;
pub use self::post_object_detection::PostObjectDetectionNode;

#[cfg(feature = "render")]
pub use self::bbox_image::BBoxImageNode;

#[derive(Error, Debug)]
pub enum NodeError {
  #[error("消息中缺少字段: {0}")]
  MissingField(String),
  #[error("消息字段格式错误: {0}")]
  InvalidPayload(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("后处理错误: {0}")]
  Detection(#[from] DetectionError),
  #[cfg(feature = "render")]
  #[error("绘制错误: {0}")]
  Render(#[from] RenderError),
}

/// 宿主消息流中的一个处理单元
pub trait Node {
  type Error;

  fn handle_request(&mut self, message: &Value) -> Result<Value, Self::Error>;

  fn shutdown(&mut self) {}
}

/// 把结果包装成回复消息
pub fn reply(payload: Value) -> Value {
  serde_json::json!({ "payload": payload })
}
