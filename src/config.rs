// 该文件是 Kuangtu （框图） 项目的一部分。
// src/config.rs - 后处理与绘制配置
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

//! # 配置
//!
//! 宿主传入的节点配置都是字符串。本模块把字符串键值对解析成强类型配置，
//! 非法数值不会中断请求，而是记录警告并回退到默认值。
//!
//! 配置也可以写成 URL 查询参数：
//!
//! ```
//! use kuangtu::{FromUrl, config::{PostProcessConfig, RenderStyle}};
//! use url::Url;
//!
//! let url = Url::parse("detect:?iou=0.4&min_score=0.3&max_boxes=10").unwrap();
//! let config = PostProcessConfig::from_url(&url).unwrap();
//! assert_eq!(config.max_num_boxes, 10);
//!
//! let url = Url::parse("style:?stroke_width=abc").unwrap();
//! let style = RenderStyle::from_url(&url).unwrap();
//! assert_eq!(style.stroke_width, 2);
//! ```

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const DEFAULT_MAX_NUM_BOXES: usize = 20;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_STROKE_WIDTH: u32 = 2;
pub const DEFAULT_FONT_SIZE: u32 = 10;
/// 线宽与字号的上限（像素）
pub const MAX_STYLE_PIXELS: u32 = 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("无法识别的取值: {0}")]
  UnknownValue(String),
}

/// 解析一个配置值；为空时静默使用默认值，无法解析或不满足 `valid` 时记录警告并使用默认值
pub fn parse_or_default<T>(
  key: &str,
  value: Option<&str>,
  default: T,
  valid: impl Fn(&T) -> bool,
) -> T
where
  T: FromStr + fmt::Display,
{
  let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
    return default;
  };

  match raw.parse::<T>() {
    Ok(parsed) if valid(&parsed) => parsed,
    Ok(_) => {
      warn!("配置项 {} 的值 '{}' 超出范围，使用默认值 {}", key, raw, default);
      default
    }
    Err(_) => {
      warn!("配置项 {} 的值 '{}' 无法解析，使用默认值 {}", key, raw, default);
      default
    }
  }
}

/// 抑制时是否区分类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionScope {
  /// 所有框共用一个候选列表
  #[default]
  ClassAgnostic,
  /// 只有同一最佳类别的框之间才会互相抑制
  PerClass,
}

impl FromStr for SuppressionScope {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "agnostic" | "class-agnostic" | "all" => Ok(SuppressionScope::ClassAgnostic),
      "class" | "per-class" => Ok(SuppressionScope::PerClass),
      other => Err(ConfigError::UnknownValue(other.to_string())),
    }
  }
}

impl fmt::Display for SuppressionScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SuppressionScope::ClassAgnostic => write!(f, "agnostic"),
      SuppressionScope::PerClass => write!(f, "per-class"),
    }
  }
}

/// 检测框坐标的解释方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatePolicy {
  /// 坐标总是归一化的，绘制时乘以图像宽高
  #[default]
  Normalized,
  /// 任一坐标严格大于 1.0 时，整个框按像素坐标处理
  Infer,
}

impl FromStr for CoordinatePolicy {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "normalized" => Ok(CoordinatePolicy::Normalized),
      "infer" | "auto" => Ok(CoordinatePolicy::Infer),
      other => Err(ConfigError::UnknownValue(other.to_string())),
    }
  }
}

impl fmt::Display for CoordinatePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CoordinatePolicy::Normalized => write!(f, "normalized"),
      CoordinatePolicy::Infer => write!(f, "infer"),
    }
  }
}

/// 检测后处理配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessConfig {
  /// 最多保留的检测框数量
  pub max_num_boxes: usize,
  /// NMS IoU 阈值，取值 [0, 1]
  pub iou_threshold: f32,
  /// 最低得分
  pub score_threshold: f32,
  pub scope: SuppressionScope,
}

impl Default for PostProcessConfig {
  fn default() -> Self {
    Self {
      max_num_boxes: DEFAULT_MAX_NUM_BOXES,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      scope: SuppressionScope::default(),
    }
  }
}

impl PostProcessConfig {
  /// 从字符串键值对构造配置，同时接受 `min_score` 与宿主的 `minScore` 写法
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut config = Self::default();
    for (key, value) in pairs {
      let (key, value) = (key.as_ref(), Some(value.as_ref()));
      match key {
        "max_boxes" | "max_num_boxes" | "maxNumBoxes" => {
          config.max_num_boxes = parse_or_default(key, value, DEFAULT_MAX_NUM_BOXES, |_| true);
        }
        "iou" | "iou_threshold" => {
          config.iou_threshold = parse_or_default(key, value, DEFAULT_IOU_THRESHOLD, |v: &f32| {
            (0.0..=1.0).contains(v)
          });
        }
        "min_score" | "minScore" | "score_threshold" => {
          config.score_threshold =
            parse_or_default(key, value, DEFAULT_SCORE_THRESHOLD, |v: &f32| v.is_finite());
        }
        "scope" => {
          config.scope = parse_or_default(key, value, SuppressionScope::default(), |_| true);
        }
        _ => debug!("忽略后处理配置项: {}", key),
      }
    }
    config
  }
}

impl FromUrlWithScheme for PostProcessConfig {
  const SCHEME: &'static str = "detect";
}

impl FromUrl for PostProcessConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Ok(Self::from_pairs(url.query_pairs()))
  }
}

/// 绘制样式
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
  /// 边框线宽（像素，至少为 1）
  pub stroke_width: u32,
  /// 标签字号（像素，至少为 1）
  pub font_size: u32,
  pub coordinates: CoordinatePolicy,
  /// 标签字体文件，未指定时在系统常见位置查找
  pub font: Option<PathBuf>,
}

impl Default for RenderStyle {
  fn default() -> Self {
    Self {
      stroke_width: DEFAULT_STROKE_WIDTH,
      font_size: DEFAULT_FONT_SIZE,
      coordinates: CoordinatePolicy::default(),
      font: None,
    }
  }
}

impl RenderStyle {
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut style = Self::default();
    for (key, value) in pairs {
      let (key, value) = (key.as_ref(), value.as_ref());
      match key {
        "stroke_width" | "strokeWidth" | "line_width" => {
          style.stroke_width = parse_or_default(key, Some(value), DEFAULT_STROKE_WIDTH, |v: &u32| {
            (1..=MAX_STYLE_PIXELS).contains(v)
          });
        }
        "font_size" | "fontSize" => {
          style.font_size = parse_or_default(key, Some(value), DEFAULT_FONT_SIZE, |v: &u32| {
            (1..=MAX_STYLE_PIXELS).contains(v)
          });
        }
        "coordinates" => {
          style.coordinates =
            parse_or_default(key, Some(value), CoordinatePolicy::default(), |_| true);
        }
        "font" => {
          let value = value.trim();
          style.font = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        _ => debug!("忽略绘制配置项: {}", key),
      }
    }
    style
  }
}

impl FromUrlWithScheme for RenderStyle {
  const SCHEME: &'static str = "style";
}

impl FromUrl for RenderStyle {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Ok(Self::from_pairs(url.query_pairs()))
  }
}

fn check_scheme(url: &Url, expected: &'static str) -> Result<(), ConfigError> {
  if url.scheme() != expected {
    warn!(
      "URI 方案不匹配: 期望 '{}', 实际 '{}'",
      expected,
      url.scheme()
    );
    return Err(ConfigError::SchemeMismatch {
      expected,
      found: url.scheme().to_string(),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_node_defaults() {
    let config = PostProcessConfig::default();
    assert_eq!(config.max_num_boxes, 20);
    assert_eq!(config.iou_threshold, 0.5);
    assert_eq!(config.score_threshold, 0.5);
    assert_eq!(config.scope, SuppressionScope::ClassAgnostic);

    let style = RenderStyle::default();
    assert_eq!(style.stroke_width, 2);
    assert_eq!(style.font_size, 10);
    assert_eq!(style.coordinates, CoordinatePolicy::Normalized);
  }

  #[test]
  fn malformed_stroke_width_falls_back() {
    let style = RenderStyle::from_pairs([("strokeWidth", "abc"), ("fontSize", "14")]);
    assert_eq!(style.stroke_width, DEFAULT_STROKE_WIDTH);
    assert_eq!(style.font_size, 14);
  }

  #[test]
  fn zero_sizes_fall_back() {
    let style = RenderStyle::from_pairs([("stroke_width", "0"), ("font_size", "-3")]);
    assert_eq!(style.stroke_width, DEFAULT_STROKE_WIDTH);
    assert_eq!(style.font_size, DEFAULT_FONT_SIZE);
  }

  #[test]
  fn oversized_style_values_fall_back() {
    let style =
      RenderStyle::from_pairs([("fontSize", "2147483647"), ("strokeWidth", "4294967295")]);
    assert_eq!(style.font_size, DEFAULT_FONT_SIZE);
    assert_eq!(style.stroke_width, DEFAULT_STROKE_WIDTH);

    let style = RenderStyle::from_pairs([("fontSize", "1024"), ("strokeWidth", "1025")]);
    assert_eq!(style.font_size, MAX_STYLE_PIXELS);
    assert_eq!(style.stroke_width, DEFAULT_STROKE_WIDTH);
  }

  #[test]
  fn host_config_names_are_accepted() {
    let config =
      PostProcessConfig::from_pairs([("iou", "0.3"), ("minScore", "0.25"), ("scope", "class")]);
    assert_eq!(config.iou_threshold, 0.3);
    assert_eq!(config.score_threshold, 0.25);
    assert_eq!(config.scope, SuppressionScope::PerClass);
  }

  #[test]
  fn empty_and_out_of_range_values_use_defaults() {
    let config =
      PostProcessConfig::from_pairs([("iou", "1.5"), ("minScore", ""), ("max_boxes", "x")]);
    assert_eq!(config, PostProcessConfig::default());
  }

  #[test]
  fn url_query_is_parsed() {
    let url = Url::parse("style:?stroke_width=4&coordinates=infer&font=/tmp/a.ttf").unwrap();
    let style = RenderStyle::from_url(&url).unwrap();
    assert_eq!(style.stroke_width, 4);
    assert_eq!(style.coordinates, CoordinatePolicy::Infer);
    assert_eq!(style.font, Some(PathBuf::from("/tmp/a.ttf")));
  }

  #[test]
  fn url_scheme_is_checked() {
    let url = Url::parse("style:?iou=0.1").unwrap();
    assert_eq!(
      PostProcessConfig::from_url(&url),
      Err(ConfigError::SchemeMismatch {
        expected: "detect",
        found: "style".to_string(),
      })
    );
  }
}
