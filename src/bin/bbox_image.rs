// 该文件是 Kuangtu （框图） 项目的一部分。
// src/bin/bbox_image.rs - 检测框绘制命令行
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use kuangtu::{
  FromUrl,
  config::RenderStyle,
  input::ImageFileInput,
  model::DetectedObject,
  output::{AnnotationRenderer, SaveImageFileOutput},
};

/// 把检测结果画到图像上
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///data/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测结果 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub detections: PathBuf,
  /// 输出图像，例如 image:///data/output.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 边框线宽（像素）
  #[arg(long, value_name = "PIXELS")]
  pub stroke_width: Option<String>,
  /// 标签字号（像素）
  #[arg(long, value_name = "PIXELS")]
  pub font_size: Option<String>,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<String>,
  /// 坐标解释方式: normalized 或 infer
  #[arg(long, value_name = "POLICY")]
  pub coordinates: Option<String>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入图像: {}", args.input);
  info!("检测结果: {}", args.detections.display());
  info!("输出路径: {}", args.output);

  let pairs = [
    ("stroke_width", args.stroke_width.as_deref()),
    ("font_size", args.font_size.as_deref()),
    ("font", args.font.as_deref()),
    ("coordinates", args.coordinates.as_deref()),
  ]
  .into_iter()
  .filter_map(|(k, v)| v.map(|v| (k, v)));
  let style = RenderStyle::from_pairs(pairs);

  let image = ImageFileInput::from_url(&args.input)?;
  let text = std::fs::read_to_string(&args.detections)
    .with_context(|| format!("无法读取检测结果: {}", args.detections.display()))?;
  let detections: Vec<DetectedObject> = serde_json::from_str(&text)?;
  let output = SaveImageFileOutput::from_url(&args.output)?;

  let mut renderer = AnnotationRenderer::new(style)?.with_format(output.format());
  let now = std::time::Instant::now();
  let annotated = renderer.render(Some(image.as_bytes()), Some(&detections))?;
  info!("绘制完成，耗时: {:.2?}", now.elapsed());

  output.save(&annotated)?;

  Ok(())
}
