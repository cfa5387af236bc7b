// 该文件是 Kuangtu （框图） 项目的一部分。
// src/node/post_object_detection.rs - 检测后处理节点
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

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{FieldSelector, Node, NodeError, reply};
use crate::{
  config::PostProcessConfig,
  input::TensorPayload,
  label::ClassNames,
  model::{PostProcessor, RawTensors},
};

/// 收到模型输出张量，回复检测结果列表
pub struct PostObjectDetectionNode {
  processor: PostProcessor<ClassNames>,
  tensors: FieldSelector,
}

impl PostObjectDetectionNode {
  pub fn new(config: PostProcessConfig, classes: ClassNames) -> Self {
    info!(
      "创建后处理节点: 最多 {} 个框, IoU 阈值 {}, 得分阈值 {}",
      config.max_num_boxes, config.iou_threshold, config.score_threshold
    );
    Self {
      processor: PostProcessor::new(config, classes),
      tensors: FieldSelector::payload(""),
    }
  }

  /// 按宿主的字符串配置创建节点
  ///
  /// 识别 `classesURL`/`classes`（类别表 URL）和 `field`（张量所在字段），
  /// 其余键交给 [`PostProcessConfig::from_pairs`]。
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let pairs: Vec<(String, String)> = pairs
      .into_iter()
      .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
      .collect();

    let classes = pairs
      .iter()
      .find(|(k, _)| k == "classesURL" || k == "classes")
      .map(|(_, v)| ClassNames::load_or_index(v))
      .unwrap_or_default();
    let node = Self::new(PostProcessConfig::from_pairs(pairs.iter().cloned()), classes);

    match pairs.iter().find(|(k, _)| k == "field") {
      Some((_, field)) => node.with_selector(FieldSelector::parse(field)),
      None => node,
    }
  }

  pub fn with_selector(mut self, tensors: FieldSelector) -> Self {
    self.tensors = tensors;
    self
  }

  pub fn processor(&self) -> &PostProcessor<ClassNames> {
    &self.processor
  }
}

impl Node for PostObjectDetectionNode {
  type Error = NodeError;

  fn handle_request(&mut self, message: &Value) -> Result<Value, Self::Error> {
    let value = self
      .tensors
      .select(message)
      .ok_or_else(|| NodeError::MissingField(self.tensors.to_string()))?;
    let payload = TensorPayload::deserialize(value)?;
    let tensors = RawTensors::try_from(payload)?;

    let objects = self.processor.process(&tensors)?;
    Ok(reply(serde_json::to_value(objects)?))
  }

  fn shutdown(&mut self) {
    info!("后处理节点关闭");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn request() -> Value {
    json!({
      "payload": {
        "scores": [0.1, 0.9, 0.8, 0.05],
        "scoresShape": [1, 2, 2],
        "boxes": [0.2, 0.1, 0.6, 0.5, 0.0, 0.0, 0.1, 0.1],
        "boxesShape": [1, 2, 1, 4]
      }
    })
  }

  #[test]
  fn replies_with_detected_objects() {
    let mut node = PostObjectDetectionNode::new(PostProcessConfig::default(), ClassNames::Index);
    let reply = node.handle_request(&request()).unwrap();

    let objects = reply["payload"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0]["className"], "1");
    assert_eq!(objects[1]["className"], "0");
    let bbox: Vec<f64> = objects[0]["bbox"]
      .as_array()
      .unwrap()
      .iter()
      .map(|v| v.as_f64().unwrap())
      .collect();
    for (a, e) in bbox.iter().zip([0.1, 0.2, 0.4, 0.4]) {
      assert!((a - e).abs() < 1e-6);
    }
  }

  #[test]
  fn configuration_from_host_strings() {
    let mut node = PostObjectDetectionNode::from_pairs([
      ("minScore", "0.85"),
      ("iou", "oops"),
      ("field", "msg.tensors"),
      ("classesURL", ""),
    ]);
    assert_eq!(node.processor().config().score_threshold, 0.85);
    assert_eq!(node.processor().config().iou_threshold, 0.5);

    let msg = json!({ "tensors": request()["payload"].clone() });
    let reply = node.handle_request(&msg).unwrap();
    assert_eq!(reply["payload"].as_array().unwrap().len(), 1);
  }

  #[test]
  fn failures_are_local_to_a_request() {
    let mut node = PostObjectDetectionNode::new(PostProcessConfig::default(), ClassNames::Index);

    assert!(matches!(
      node.handle_request(&json!({ "topic": "nothing" })),
      Err(NodeError::MissingField(_))
    ));
    let mut broken = request();
    broken["payload"]["scoresShape"] = json!([1, 3, 2]);
    assert!(matches!(
      node.handle_request(&broken),
      Err(NodeError::Detection(_))
    ));
    assert!(matches!(
      node.handle_request(&json!({ "payload": "text" })),
      Err(NodeError::InvalidPayload(_))
    ));

    assert!(node.handle_request(&request()).is_ok());
  }
}
