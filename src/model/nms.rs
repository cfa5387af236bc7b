// 该文件是 Kuangtu （框图） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use super::{BOX_COORDS, DetectionError};

/// 计算两个 `[y1, x1, y2, x2]` 框的 IoU
///
/// 角点顺序颠倒的框会先被规整；面积为 0 的框与任何框的 IoU 都是 0。
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
  let (a_ymin, a_xmin) = (a[0].min(a[2]), a[1].min(a[3]));
  let (a_ymax, a_xmax) = (a[0].max(a[2]), a[1].max(a[3]));
  let (b_ymin, b_xmin) = (b[0].min(b[2]), b[1].min(b[3]));
  let (b_ymax, b_xmax) = (b[0].max(b[2]), b[1].max(b[3]));

  let area_a = (a_ymax - a_ymin) * (a_xmax - a_xmin);
  let area_b = (b_ymax - b_ymin) * (b_xmax - b_xmin);
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let inter_h = (a_ymax.min(b_ymax) - a_ymin.max(b_ymin)).max(0.0);
  let inter_w = (a_xmax.min(b_xmax) - a_xmin.max(b_xmin)).max(0.0);
  let intersection = inter_h * inter_w;
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心非极大值抑制
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressionEngine {
  max_outputs: usize,
  iou_threshold: f32,
  score_threshold: f32,
}

impl SuppressionEngine {
  pub fn new(
    max_outputs: usize,
    iou_threshold: f32,
    score_threshold: f32,
  ) -> Result<Self, DetectionError> {
    if !(0.0..=1.0).contains(&iou_threshold) {
      return Err(DetectionError::InvalidThreshold(iou_threshold));
    }
    Ok(Self {
      max_outputs,
      iou_threshold,
      score_threshold,
    })
  }

  pub fn max_outputs(&self) -> usize {
    self.max_outputs
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  /// 不区分类别的抑制，返回按得分降序排列的保留框索引
  pub fn suppress(&self, boxes: &[f32], scores: &[f32]) -> Result<Vec<usize>, DetectionError> {
    check_lengths(boxes, scores.len())?;
    Ok(self.greedy(boxes, scores, |_, _| true))
  }

  /// 只在最佳类别相同的框之间做抑制
  pub fn suppress_by_class(
    &self,
    boxes: &[f32],
    scores: &[f32],
    classes: &[usize],
  ) -> Result<Vec<usize>, DetectionError> {
    check_lengths(boxes, scores.len())?;
    if classes.len() != scores.len() {
      return Err(DetectionError::ShapeMismatch {
        what: "classes",
        expected: scores.len(),
        actual: classes.len(),
      });
    }
    Ok(self.greedy(boxes, scores, |a, b| classes[a] == classes[b]))
  }

  fn greedy(
    &self,
    boxes: &[f32],
    scores: &[f32],
    competes: impl Fn(usize, usize) -> bool,
  ) -> Vec<usize> {
    let mut candidates: Vec<usize> = (0..scores.len())
      .filter(|&i| scores[i] >= self.score_threshold)
      .collect();
    // 稳定排序，得分相同时索引小的在前
    candidates.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    debug!(
      "NMS 候选框 {} 个 (得分阈值 {})",
      candidates.len(),
      self.score_threshold
    );

    let mut kept: Vec<usize> = Vec::with_capacity(self.max_outputs.min(candidates.len()));
    'candidates: for idx in candidates {
      if kept.len() >= self.max_outputs {
        break;
      }
      let current = box_at(boxes, idx);
      for &selected in kept.iter() {
        if competes(selected, idx) && iou(box_at(boxes, selected), current) > self.iou_threshold {
          continue 'candidates;
        }
      }
      kept.push(idx);
    }

    kept
  }
}

/// 按给定参数执行一次不区分类别的 NMS
pub fn non_max_suppression(
  boxes: &[f32],
  scores: &[f32],
  max_outputs: usize,
  iou_threshold: f32,
  score_threshold: f32,
) -> Result<Vec<usize>, DetectionError> {
  SuppressionEngine::new(max_outputs, iou_threshold, score_threshold)?.suppress(boxes, scores)
}

fn check_lengths(boxes: &[f32], num_scores: usize) -> Result<(), DetectionError> {
  let expected = num_scores * BOX_COORDS;
  if boxes.len() != expected {
    return Err(DetectionError::ShapeMismatch {
      what: "boxes",
      expected,
      actual: boxes.len(),
    });
  }
  Ok(())
}

fn box_at(boxes: &[f32], index: usize) -> [f32; 4] {
  let base = index * BOX_COORDS;
  [boxes[base], boxes[base + 1], boxes[base + 2], boxes[base + 3]]
}
