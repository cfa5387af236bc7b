// 该文件是 Kuangtu （框图） 项目的一部分。
// src/model/score.rs - 类别得分归约
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

use super::DetectionError;

/// 单个框的最佳类别与得分
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedBox {
  pub best_class_index: usize,
  pub best_score: f32,
}

/// 所有框的归约结果，两个数组按框的索引对齐
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedScores {
  pub best_scores: Vec<f32>,
  pub best_classes: Vec<usize>,
}

impl ReducedScores {
  pub fn len(&self) -> usize {
    self.best_scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.best_scores.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<ReducedBox> {
    Some(ReducedBox {
      best_class_index: *self.best_classes.get(index)?,
      best_score: *self.best_scores.get(index)?,
    })
  }
}

/// 对每一行类别得分取最大值及其类别编号
///
/// 得分原样传递，不做 softmax/sigmoid。最大值相同时取编号最小的类别。
pub fn reduce_scores(
  scores: &[f32],
  num_boxes: usize,
  num_classes: usize,
) -> Result<ReducedScores, DetectionError> {
  let expected = num_boxes
    .checked_mul(num_classes)
    .ok_or_else(|| DetectionError::InvalidShape(format!("{} x {} 溢出", num_boxes, num_classes)))?;
  if scores.len() != expected {
    return Err(DetectionError::ShapeMismatch {
      what: "scores",
      expected,
      actual: scores.len(),
    });
  }
  if num_boxes == 0 {
    return Ok(ReducedScores::default());
  }
  if num_classes == 0 {
    return Err(DetectionError::InvalidShape("类别数量为 0".to_string()));
  }

  let mut reduced = ReducedScores {
    best_scores: Vec::with_capacity(num_boxes),
    best_classes: Vec::with_capacity(num_boxes),
  };

  for row in scores.chunks_exact(num_classes) {
    // 从最小可表示值开始，保证每个框都有类别
    let mut max_score = f32::MIN;
    let mut class_idx = 0usize;
    for (c, &score) in row.iter().enumerate() {
      if score > max_score {
        max_score = score;
        class_idx = c;
      }
    }
    reduced.best_scores.push(max_score);
    reduced.best_classes.push(class_idx);
  }

  Ok(reduced)
}
