// 该文件是 Kuangtu （框图） 项目的一部分。
// src/input/tensor_file.rs - 模型输出张量输入
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

//! 上游推理输出的 JSON 表示，两种写法都可以：
//!
//! ```json
//! {"scores": [...], "scoresShape": [1, 3, 2], "boxes": [...], "boxesShape": [1, 3, 1, 4]}
//! ```
//!
//! 或者按推理输出顺序排列的张量数组（先得分后框）：
//!
//! ```json
//! [{"data": [...], "shape": [1, 3, 2]}, {"data": [...], "shape": [1, 3, 1, 4]}]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectionError, RawTensors},
};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("tensor error: {0}")]
  TensorError(#[from] DetectionError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
  pub data: Vec<f32>,
  pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TensorPayload {
  #[serde(rename_all = "camelCase")]
  Named {
    scores: Vec<f32>,
    scores_shape: Vec<usize>,
    boxes: Vec<f32>,
    boxes_shape: Vec<usize>,
  },
  Sequence([TensorData; 2]),
}

impl TryFrom<TensorPayload> for RawTensors {
  type Error = DetectionError;

  fn try_from(payload: TensorPayload) -> Result<Self, Self::Error> {
    match payload {
      TensorPayload::Named {
        scores,
        scores_shape,
        boxes,
        boxes_shape,
      } => RawTensors::from_shapes(scores, &scores_shape, boxes, &boxes_shape),
      TensorPayload::Sequence([scores, boxes]) => {
        RawTensors::from_shapes(scores.data, &scores.shape, boxes.data, &boxes.shape)
      }
    }
  }
}

/// 从 JSON 文件读取模型输出
pub struct TensorFileInput {
  tensors: RawTensors,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemaMismatch);
    }

    let text = std::fs::read_to_string(url.path())?;
    let payload: TensorPayload = serde_json::from_str(&text)?;
    let tensors = RawTensors::try_from(payload)?;
    debug!(
      "read tensors from {}: {} boxes, {} classes",
      url.path(),
      tensors.num_boxes,
      tensors.num_classes
    );

    Ok(TensorFileInput { tensors })
  }
}

impl TensorFileInput {
  pub fn tensors(&self) -> &RawTensors {
    &self.tensors
  }

  pub fn into_tensors(self) -> RawTensors {
    self.tensors
  }
}
