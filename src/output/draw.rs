// 该文件是 Kuangtu （框图） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::color::ColorCycle;
use crate::{
  config::{CoordinatePolicy, RenderStyle},
  model::DetectedObject,
};

// 文本渲染常量
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]); // 黑色
const LABEL_CHAR_WIDTH_RATIO: f32 = 0.6; // 无字体时每字符宽度与字号之比（粗略估计）
const LABEL_PADDING: u32 = 4;

const SYSTEM_FONT_PATHS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("图像无效: {0}")]
  InvalidImage(String),
  #[error("检测结果无效: {0}")]
  InvalidDetections(String),
  #[error("图像解码失败: {0}")]
  Decode(#[source] image::ImageError),
  #[error("图像编码失败: {0}")]
  Encode(#[source] image::ImageError),
  #[error("字体加载失败: {0}")]
  Font(String),
}

/// 把检测框和类别名称画到图像上
pub struct AnnotationRenderer {
  style: RenderStyle,
  colors: ColorCycle,
  font: Option<FontArc>,
  format: ImageFormat,
}

impl AnnotationRenderer {
  /// 按样式创建绘制器
  ///
  /// 样式中指定的字体加载失败时返回错误；未指定时在系统常见位置查找，
  /// 找不到则只画标签背景，不画文字。
  pub fn new(style: RenderStyle) -> Result<Self, RenderError> {
    let font = match &style.font {
      Some(path) => Some(load_font(path)?),
      None => find_system_font(),
    };
    Ok(Self::with_font(style, font))
  }

  pub fn with_font(style: RenderStyle, font: Option<FontArc>) -> Self {
    Self {
      style,
      colors: ColorCycle::default(),
      font,
      format: ImageFormat::Png,
    }
  }

  /// 输出图像的编码格式，默认 PNG
  pub fn with_format(mut self, format: ImageFormat) -> Self {
    self.format = format;
    self
  }

  pub fn with_colors(mut self, colors: ColorCycle) -> Self {
    self.colors = colors;
    self
  }

  pub fn style(&self) -> &RenderStyle {
    &self.style
  }

  pub fn colors(&self) -> &ColorCycle {
    &self.colors
  }

  pub fn reset_colors(&mut self) {
    self.colors.reset();
  }

  /// 解码图像、绘制检测结果并重新编码
  ///
  /// 图像或检测结果缺失时在解码前就返回错误。检测结果为空时原样重新编码。
  pub fn render(
    &mut self,
    image: Option<&[u8]>,
    detections: Option<&[DetectedObject]>,
  ) -> Result<Vec<u8>, RenderError> {
    let bytes = image
      .filter(|bytes| !bytes.is_empty())
      .ok_or_else(|| RenderError::InvalidImage("缺少图像数据".to_string()))?;
    let detections =
      detections.ok_or_else(|| RenderError::InvalidDetections("缺少检测结果".to_string()))?;

    let format = image::guess_format(bytes)
      .map_err(|_| RenderError::InvalidImage("无法识别的图像格式".to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(RenderError::Decode)?;
    if decoded.width() == 0 || decoded.height() == 0 {
      return Err(RenderError::InvalidImage(format!(
        "图像尺寸为 {}x{}",
        decoded.width(),
        decoded.height()
      )));
    }
    debug!(
      "解码图像: {:?} {}x{}, {} 个检测结果",
      format,
      decoded.width(),
      decoded.height(),
      detections.len()
    );

    let mut canvas = decoded.to_rgba8();
    self.draw_detections(&mut canvas, detections);
    encode_image(canvas, self.format)
  }

  /// 按顺序绘制所有检测结果，每个框消耗一个颜色
  pub fn draw_detections(&mut self, image: &mut RgbaImage, detections: &[DetectedObject]) {
    for detection in detections {
      let color = self.colors.next_color();
      debug!("绘制 {} ({:.2}) 颜色 {}", detection.class_name, detection.score, color.name);
      self.draw_bbox_with_label(image, detection, color.rgba());
    }
  }

  fn draw_bbox_with_label(
    &self,
    image: &mut RgbaImage,
    detection: &DetectedObject,
    color: Rgba<u8>,
  ) {
    let [x, y, width, height] = self.to_pixels(detection.bbox, image.width(), image.height());

    // 绘制边框，线宽向框内加粗，外沿就是检测框
    let stroke_width = i32::try_from(self.style.stroke_width).unwrap_or(i32::MAX);
    for thickness in 0..stroke_width {
      let w = width.saturating_sub(thickness.saturating_mul(2));
      let h = height.saturating_sub(thickness.saturating_mul(2));
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x.saturating_add(thickness), y.saturating_add(thickness))
        .of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 标签放在框的左上方，超出画布顶端时贴住第 0 行；宽高不超过画布
    let font_size = self.style.font_size.min(image.height());
    let label_y = y.saturating_sub(font_size as i32).saturating_sub(1).max(0);
    let label_width = self
      .text_width(&detection.class_name)
      .saturating_add(LABEL_PADDING)
      .min(image.width().saturating_add(LABEL_PADDING));
    let label =
      Rect::at(x.saturating_sub(1), label_y).of_size(label_width, font_size.saturating_add(1));
    draw_filled_rect_mut(image, label, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x.saturating_add(1),
        label_y,
        PxScale::from(font_size as f32),
        font,
        &detection.class_name,
      );
    }
  }

  // 返回 [x, y, width, height] 像素坐标，限制在画布两倍范围内
  fn to_pixels(&self, bbox: [f32; 4], image_width: u32, image_height: u32) -> [i32; 4] {
    let absolute = match self.style.coordinates {
      CoordinatePolicy::Normalized => false,
      CoordinatePolicy::Infer => bbox.iter().any(|&v| v > 1.0),
    };
    let scale = |value: f32, size: u32| {
      let limit = 2.0 * size as f32;
      let pixels = if absolute { value } else { value * size as f32 };
      pixels.round().clamp(-limit, limit) as i32
    };
    [
      scale(bbox[0], image_width),
      scale(bbox[1], image_height),
      scale(bbox[2], image_width),
      scale(bbox[3], image_height),
    ]
  }

  fn text_width(&self, text: &str) -> u32 {
    let font_size = self.style.font_size as f32;
    match &self.font {
      Some(font) => text_size(PxScale::from(font_size), font, text).0,
      None => (text.chars().count() as f32 * font_size * LABEL_CHAR_WIDTH_RATIO).ceil() as u32,
    }
  }
}

pub fn encode_image(image: RgbaImage, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
  let image = match format {
    // JPEG 不支持透明通道
    ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
    _ => DynamicImage::ImageRgba8(image),
  };
  let mut buffer = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buffer), format)
    .map_err(RenderError::Encode)?;
  Ok(buffer)
}

pub fn load_font(path: &Path) -> Result<FontArc, RenderError> {
  let data = std::fs::read(path)
    .map_err(|e| RenderError::Font(format!("{}: {}", path.display(), e)))?;
  let font = FontArc::try_from_vec(data)
    .map_err(|_| RenderError::Font(format!("无法解析字体文件: {}", path.display())))?;
  info!("加载字体: {}", path.display());
  Ok(font)
}

fn find_system_font() -> Option<FontArc> {
  for path in SYSTEM_FONT_PATHS {
    if let Ok(data) = std::fs::read(path)
      && let Ok(font) = FontArc::try_from_vec(data)
    {
      info!("加载系统字体: {}", path);
      return Some(font);
    }
  }
  warn!("未找到系统字体，标签只绘制背景");
  None
}
