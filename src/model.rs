// 该文件是 Kuangtu （框图） 项目的一部分。
// src/model.rs - 检测模型输出后处理
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  config::{PostProcessConfig, SuppressionScope},
  label::{ClassNames, LabelLookup},
};

mod build;
mod nms;
mod score;

pub use self::build::build_detections;
pub use self::nms::{SuppressionEngine, iou, non_max_suppression};
pub use self::score::{ReducedBox, ReducedScores, reduce_scores};

/// 每个框的坐标数量，顺序为 `[y1, x1, y2, x2]`
pub const BOX_COORDS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DetectionError {
  #[error("输入形状不匹配: {what} 期望长度 {expected}, 实际长度 {actual}")]
  ShapeMismatch {
    what: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("输入形状无效: {0}")]
  InvalidShape(String),
  #[error("IoU 阈值必须在 [0, 1] 之间, 实际为 {0}")]
  InvalidThreshold(f32),
  #[error("检测框索引越界: {index} >= {len}")]
  IndexOutOfRange { index: usize, len: usize },
}

/// 检测结果，坐标为归一化的 `[x, y, width, height]`，原点在左上角
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
  pub bbox: [f32; 4],
  pub class_name: String,
  pub score: f32,
}

/// 上游推理给出的原始张量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTensors {
  /// `[num_boxes, num_classes]`，行优先
  pub scores: Vec<f32>,
  /// `[num_boxes, 4]`，每行 `[y1, x1, y2, x2]`
  pub boxes: Vec<f32>,
  pub num_boxes: usize,
  pub num_classes: usize,
}

impl RawTensors {
  /// 按上游张量形状构造，得分形状形如 `[1, B, C]`，框形状形如 `[1, B, 1, 4]`
  pub fn from_shapes(
    scores: Vec<f32>,
    scores_shape: &[usize],
    boxes: Vec<f32>,
    boxes_shape: &[usize],
  ) -> Result<Self, DetectionError> {
    let (num_boxes, num_classes) = split_last(scores_shape, "scores")?;
    let (box_rows, box_coords) = split_last(boxes_shape, "boxes")?;

    if box_coords != BOX_COORDS {
      return Err(DetectionError::InvalidShape(format!(
        "框张量最后一维应为 {}, 实际为 {}",
        BOX_COORDS, box_coords
      )));
    }
    if box_rows != num_boxes {
      return Err(DetectionError::ShapeMismatch {
        what: "boxes rows",
        expected: num_boxes,
        actual: box_rows,
      });
    }

    let tensors = Self {
      scores,
      boxes,
      num_boxes,
      num_classes,
    };
    tensors.validate()?;
    Ok(tensors)
  }

  /// 检查缓冲区长度与声明的形状一致
  pub fn validate(&self) -> Result<(), DetectionError> {
    let expected_scores = checked_len(self.num_boxes, self.num_classes)?;
    if self.scores.len() != expected_scores {
      return Err(DetectionError::ShapeMismatch {
        what: "scores",
        expected: expected_scores,
        actual: self.scores.len(),
      });
    }
    let expected_boxes = checked_len(self.num_boxes, BOX_COORDS)?;
    if self.boxes.len() != expected_boxes {
      return Err(DetectionError::ShapeMismatch {
        what: "boxes",
        expected: expected_boxes,
        actual: self.boxes.len(),
      });
    }
    Ok(())
  }
}

fn checked_len(rows: usize, cols: usize) -> Result<usize, DetectionError> {
  rows
    .checked_mul(cols)
    .ok_or_else(|| DetectionError::InvalidShape(format!("{} x {} 溢出", rows, cols)))
}

// 最后一维之前的所有维度相乘作为行数
fn split_last(shape: &[usize], what: &str) -> Result<(usize, usize), DetectionError> {
  let Some((&last, leading)) = shape.split_last() else {
    return Err(DetectionError::InvalidShape(format!("{} 形状为空", what)));
  };
  if leading.is_empty() {
    return Err(DetectionError::InvalidShape(format!(
      "{} 形状至少需要两维, 实际为 {:?}",
      what, shape
    )));
  }
  let rows = leading
    .iter()
    .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    .ok_or_else(|| DetectionError::InvalidShape(format!("{} 形状 {:?} 溢出", what, shape)))?;
  Ok((rows, last))
}

/// 检测后处理：得分归约、非极大值抑制、构造检测结果
#[derive(Debug, Clone)]
pub struct PostProcessor<L = ClassNames> {
  config: PostProcessConfig,
  labels: L,
}

impl Default for PostProcessor<ClassNames> {
  fn default() -> Self {
    Self::new(PostProcessConfig::default(), ClassNames::Index)
  }
}

impl<L: LabelLookup> PostProcessor<L> {
  pub fn new(config: PostProcessConfig, labels: L) -> Self {
    Self { config, labels }
  }

  pub fn config(&self) -> &PostProcessConfig {
    &self.config
  }

  pub fn labels(&self) -> &L {
    &self.labels
  }

  pub fn set_labels(&mut self, labels: L) {
    self.labels = labels;
  }

  pub fn process(&self, tensors: &RawTensors) -> Result<Vec<DetectedObject>, DetectionError> {
    tensors.validate()?;
    debug!(
      "后处理输入: {} 个候选框, {} 个类别",
      tensors.num_boxes, tensors.num_classes
    );

    let reduced = reduce_scores(&tensors.scores, tensors.num_boxes, tensors.num_classes)?;
    let engine = SuppressionEngine::new(
      self.config.max_num_boxes,
      self.config.iou_threshold,
      self.config.score_threshold,
    )?;
    debug!(
      "NMS 输入 {} 个框: 最多保留 {}, IoU 阈值 {}, 得分阈值 {}",
      reduced.len(),
      engine.max_outputs(),
      engine.iou_threshold(),
      engine.score_threshold()
    );
    let indices = match self.config.scope {
      SuppressionScope::ClassAgnostic => engine.suppress(&tensors.boxes, &reduced.best_scores)?,
      SuppressionScope::PerClass => {
        engine.suppress_by_class(&tensors.boxes, &reduced.best_scores, &reduced.best_classes)?
      }
    };
    debug!("NMS 保留 {} 个框: {:?}", indices.len(), indices);

    let objects = build_detections(
      &tensors.boxes,
      &reduced.best_scores,
      &indices,
      &reduced.best_classes,
      &self.labels,
    )?;
    debug!("检测到 {} 个物体", objects.len());

    Ok(objects)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tensors() -> RawTensors {
    RawTensors {
      // 3 个框, 2 个类别
      scores: vec![0.9, 0.1, 0.2, 0.8, 0.3, 0.1],
      boxes: vec![
        0.0, 0.0, 0.5, 0.5, //
        0.0, 0.0, 0.5, 0.45, //
        0.6, 0.6, 0.9, 0.9,
      ],
      num_boxes: 3,
      num_classes: 2,
    }
  }

  #[test]
  fn shapes_follow_upstream_layout() {
    let t = tensors();
    let parsed =
      RawTensors::from_shapes(t.scores.clone(), &[1, 3, 2], t.boxes.clone(), &[1, 3, 1, 4])
        .unwrap();
    assert_eq!(parsed, t);
  }

  #[test]
  fn shape_mismatch_is_rejected_before_processing() {
    let mut t = tensors();
    t.scores.pop();
    assert_eq!(
      PostProcessor::default().process(&t),
      Err(DetectionError::ShapeMismatch {
        what: "scores",
        expected: 6,
        actual: 5,
      })
    );

    let t = tensors();
    assert!(matches!(
      RawTensors::from_shapes(t.scores, &[1, 3, 2], t.boxes, &[1, 2, 1, 4]),
      Err(DetectionError::ShapeMismatch { .. })
    ));
    assert!(matches!(
      RawTensors::from_shapes(vec![], &[0], vec![], &[1, 0, 1, 4]),
      Err(DetectionError::InvalidShape(_))
    ));
  }

  #[test]
  fn class_agnostic_pipeline() {
    let processor =
      PostProcessor::new(PostProcessConfig::default(), |idx: usize| format!("c{}", idx));
    let objects = processor.process(&tensors()).unwrap();

    // 第二个框与第一个框重叠度高, 被抑制; 第三个框得分低于阈值
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].class_name, "c0");
    assert_eq!(objects[0].score, 0.9);
  }

  #[test]
  fn per_class_scope_keeps_other_classes() {
    let config = PostProcessConfig {
      scope: SuppressionScope::PerClass,
      ..PostProcessConfig::default()
    };
    let objects = PostProcessor::new(config, ClassNames::Index)
      .process(&tensors())
      .unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].class_name, "0");
    assert_eq!(objects[1].class_name, "1");
    assert_eq!(objects[1].score, 0.8);
  }

  #[test]
  fn detected_object_uses_host_field_names() {
    let object = DetectedObject {
      bbox: [0.5, 0.25, 0.25, 0.5],
      class_name: "cat".to_string(),
      score: 0.5,
    };
    let json = serde_json::to_value(&object).unwrap();
    assert_eq!(json["className"], "cat");
    assert_eq!(json["bbox"][1], 0.25);
  }
}
