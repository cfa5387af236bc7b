// 该文件是 Kuangtu （框图） 项目的一部分。
// src/node/bbox_image.rs - 检测框绘制节点
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
use tracing::{debug, info};

use super::{FieldSelector, Node, NodeError, reply};
use crate::{
  config::RenderStyle,
  model::DetectedObject,
  output::{AnnotationRenderer, RenderError},
};

/// 收到图像和检测结果，回复绘制后的图像字节
///
/// 图像字段可以是字节数组，也可以是图像文件路径。
pub struct BBoxImageNode {
  renderer: AnnotationRenderer,
  image: FieldSelector,
  objects: FieldSelector,
}

impl BBoxImageNode {
  pub fn new(renderer: AnnotationRenderer) -> Self {
    info!(
      "创建绘制节点: 线宽 {}, 字号 {}",
      renderer.style().stroke_width,
      renderer.style().font_size
    );
    Self {
      renderer,
      image: FieldSelector::payload("image"),
      objects: FieldSelector::payload("objects"),
    }
  }

  /// 按宿主的字符串配置创建节点
  ///
  /// 识别 `image` 与 `objects`（字段路径），其余键交给 [`RenderStyle::from_pairs`]。
  pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, RenderError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let pairs: Vec<(String, String)> = pairs
      .into_iter()
      .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
      .collect();

    let renderer = AnnotationRenderer::new(RenderStyle::from_pairs(pairs.iter().cloned()))?;
    let mut node = Self::new(renderer);
    for (key, value) in pairs.iter() {
      match key.as_str() {
        "image" => node.image = FieldSelector::parse(value),
        "objects" => node.objects = FieldSelector::parse(value),
        _ => {}
      }
    }
    Ok(node)
  }

  pub fn with_selectors(mut self, image: FieldSelector, objects: FieldSelector) -> Self {
    self.image = image;
    self.objects = objects;
    self
  }

  pub fn renderer(&self) -> &AnnotationRenderer {
    &self.renderer
  }

  fn image_bytes(&self, message: &Value) -> Result<Option<Vec<u8>>, NodeError> {
    match self.image.select(message) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(path)) => {
        debug!("从文件读取图像: {}", path);
        Ok(Some(std::fs::read(path)?))
      }
      Some(value) => Ok(Some(Vec::<u8>::deserialize(value)?)),
    }
  }

  fn detections(&self, message: &Value) -> Result<Option<Vec<DetectedObject>>, NodeError> {
    match self.objects.select(message) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => Ok(Some(Vec::<DetectedObject>::deserialize(value)?)),
    }
  }
}

impl Node for BBoxImageNode {
  type Error = NodeError;

  fn handle_request(&mut self, message: &Value) -> Result<Value, Self::Error> {
    let image = self.image_bytes(message)?;
    let objects = self.detections(message)?;

    let annotated = self.renderer.render(image.as_deref(), objects.as_deref())?;
    Ok(reply(Value::from(annotated)))
  }

  fn shutdown(&mut self) {
    self.renderer.reset_colors();
    info!("绘制节点关闭");
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
  use serde_json::json;

  use super::*;

  fn png_value() -> Value {
    let image = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
      .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
      .unwrap();
    Value::from(buffer)
  }

  fn node() -> BBoxImageNode {
    BBoxImageNode::new(AnnotationRenderer::with_font(RenderStyle::default(), None))
  }

  fn reply_image(reply: &Value) -> DynamicImage {
    let bytes = Vec::<u8>::deserialize(&reply["payload"]).unwrap();
    image::load_from_memory(&bytes).unwrap()
  }

  #[test]
  fn draws_objects_from_payload() {
    let msg = json!({
      "payload": {
        "image": png_value(),
        "objects": [{ "bbox": [0.25, 0.5, 0.5, 0.25], "className": "cat", "score": 0.9 }]
      }
    });
    let mut node = node();
    let image = reply_image(&node.handle_request(&msg).unwrap()).to_rgba8();

    // x 10..=29, y 20..=29
    assert_eq!(image.get_pixel(29, 29).0, [0, 255, 255, 255]);
    assert_eq!(image.get_pixel(20, 25).0, [10, 20, 30, 255]);
    assert_eq!(node.renderer().colors().cursor(), 1);
  }

  #[test]
  fn selectors_pick_message_fields() {
    let msg = json!({ "picture": png_value(), "payload": { "dets": [] } });
    let mut node =
      node().with_selectors(FieldSelector::message("picture"), FieldSelector::payload("dets"));
    let image = reply_image(&node.handle_request(&msg).unwrap());
    assert_eq!(image.width(), 40);
  }

  #[test]
  fn missing_fields_are_invalid_input() {
    let mut node = node();
    assert!(matches!(
      node.handle_request(&json!({ "payload": { "objects": [] } })),
      Err(NodeError::Render(RenderError::InvalidImage(_)))
    ));
    assert!(matches!(
      node.handle_request(&json!({ "payload": { "image": png_value() } })),
      Err(NodeError::Render(RenderError::InvalidDetections(_)))
    ));
    assert!(matches!(
      node.handle_request(&json!({
        "payload": { "image": png_value(), "objects": [{ "bbox": 1 }] }
      })),
      Err(NodeError::InvalidPayload(_))
    ));
  }

  #[test]
  fn out_of_range_boxes_in_message_still_render() {
    let msg = json!({
      "payload": {
        "image": png_value(),
        "objects": [
          { "bbox": [-1e10, 0.1, 0.2, 0.2], "className": "a", "score": 0.9 },
          { "bbox": [1e10, 0.1, 0.2, 0.2], "className": "b", "score": 0.8 }
        ]
      }
    });
    let mut node = node();
    let image = reply_image(&node.handle_request(&msg).unwrap());
    assert_eq!(image.width(), 40);
  }

  #[test]
  fn huge_font_size_falls_back_and_renders() {
    let mut node = BBoxImageNode::from_pairs([("fontSize", "2147483647"), ("font", "")]).unwrap();
    assert_eq!(node.renderer().style().font_size, 10);

    let msg = json!({
      "payload": {
        "image": png_value(),
        "objects": [{ "bbox": [0.25, 0.5, 0.5, 0.25], "className": "cat", "score": 0.9 }]
      }
    });
    assert!(node.handle_request(&msg).is_ok());
  }

  #[test]
  fn malformed_stroke_width_still_renders() {
    let mut node = BBoxImageNode::from_pairs([("strokeWidth", "abc"), ("font", "")]).unwrap();
    assert_eq!(node.renderer().style().stroke_width, 2);

    let msg = json!({ "payload": { "image": png_value(), "objects": [] } });
    assert!(node.handle_request(&msg).is_ok());
  }
}
