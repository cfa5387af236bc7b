// 该文件是 Kuangtu （框图） 项目的一部分。
// src/model/build.rs - 构造检测结果
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

use super::{BOX_COORDS, DetectedObject, DetectionError};
use crate::label::LabelLookup;

/// 按 `indices` 的顺序把保留的框转换为检测结果
///
/// 模型输出的框是 `[y1, x1, y2, x2]`，结果是 `[x, y, width, height]`。
pub fn build_detections<L: LabelLookup + ?Sized>(
  raw_boxes: &[f32],
  best_scores: &[f32],
  indices: &[usize],
  best_classes: &[usize],
  labels: &L,
) -> Result<Vec<DetectedObject>, DetectionError> {
  let len = best_scores.len();
  if best_classes.len() != len {
    return Err(DetectionError::ShapeMismatch {
      what: "classes",
      expected: len,
      actual: best_classes.len(),
    });
  }
  if raw_boxes.len() != len * BOX_COORDS {
    return Err(DetectionError::ShapeMismatch {
      what: "boxes",
      expected: len * BOX_COORDS,
      actual: raw_boxes.len(),
    });
  }

  indices
    .iter()
    .map(|&index| {
      if index >= len {
        return Err(DetectionError::IndexOutOfRange { index, len });
      }
      let base = index * BOX_COORDS;
      let (y1, x1, y2, x2) = (
        raw_boxes[base],
        raw_boxes[base + 1],
        raw_boxes[base + 2],
        raw_boxes[base + 3],
      );
      Ok(DetectedObject {
        bbox: [x1, y1, x2 - x1, y2 - y1],
        class_name: labels.lookup(best_classes[index]),
        score: best_scores[index],
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::ClassNames;

  fn assert_bbox(actual: [f32; 4], expected: [f32; 4]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
      assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
    }
  }

  #[test]
  fn reorders_axes_and_derives_size() {
    let objects =
      build_detections(&[0.2, 0.1, 0.6, 0.5], &[0.9], &[0], &[3], &ClassNames::Index).unwrap();
    assert_eq!(objects.len(), 1);
    assert_bbox(objects[0].bbox, [0.1, 0.2, 0.4, 0.4]);
    assert_eq!(objects[0].class_name, "3");
    assert_eq!(objects[0].score, 0.9);
  }

  #[test]
  fn non_square_box_keeps_width_and_height_apart() {
    // 高 0.5, 宽 0.2
    let objects =
      build_detections(&[0.1, 0.3, 0.6, 0.5], &[0.7], &[0], &[0], &ClassNames::Index).unwrap();
    assert_bbox(objects[0].bbox, [0.3, 0.1, 0.2, 0.5]);
  }

  #[test]
  fn order_follows_indices() {
    let boxes = [
      0.0, 0.0, 0.1, 0.1, //
      0.2, 0.2, 0.4, 0.4, //
      0.5, 0.5, 0.9, 0.9,
    ];
    let scores = [0.3, 0.6, 0.123_456_7];
    let names = ClassNames::from_json_str(r#"["cat", "dog"]"#).unwrap();
    let objects = build_detections(&boxes, &scores, &[2, 0], &[1, 1, 0], &names).unwrap();

    assert_eq!(objects[0].class_name, "cat");
    assert_eq!(objects[0].score, 0.123_456_7);
    assert_bbox(objects[0].bbox, [0.5, 0.5, 0.4, 0.4]);
    assert_eq!(objects[1].class_name, "dog");
  }

  #[test]
  fn bad_indices_are_rejected() {
    assert_eq!(
      build_detections(&[0.0, 0.0, 1.0, 1.0], &[0.9], &[1], &[0], &ClassNames::Index),
      Err(DetectionError::IndexOutOfRange { index: 1, len: 1 })
    );
    assert!(matches!(
      build_detections(&[0.0, 0.0, 1.0], &[0.9], &[0], &[0], &ClassNames::Index),
      Err(DetectionError::ShapeMismatch { what: "boxes", .. })
    ));
  }
}
