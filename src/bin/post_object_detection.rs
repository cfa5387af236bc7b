// 该文件是 Kuangtu （框图） 项目的一部分。
// src/bin/post_object_detection.rs - 检测后处理命令行
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
  config::PostProcessConfig,
  input::TensorFileInput,
  label::ClassNames,
  model::PostProcessor,
};

/// 把模型输出的得分和框张量转换为检测结果 JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 张量文件，例如 tensor:///data/output.json
  #[arg(long, value_name = "TENSORS")]
  pub tensors: Url,
  /// 类别表 URL（file://），不指定时用类别编号作为名称
  #[arg(long, value_name = "URL", default_value = "")]
  pub classes: String,
  /// 最多保留的检测框数量
  #[arg(long, value_name = "COUNT")]
  pub max_boxes: Option<String>,
  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<String>,
  /// 最低得分
  #[arg(long, value_name = "THRESHOLD")]
  pub min_score: Option<String>,
  /// 抑制范围: agnostic 或 per-class
  #[arg(long, value_name = "SCOPE")]
  pub scope: Option<String>,
  /// 输出文件，不指定时写到标准输出
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = Args::parse();

  info!("张量文件: {}", args.tensors);
  let pairs = [
    ("max_boxes", args.max_boxes.as_deref()),
    ("iou", args.iou.as_deref()),
    ("min_score", args.min_score.as_deref()),
    ("scope", args.scope.as_deref()),
  ]
  .into_iter()
  .filter_map(|(k, v)| v.map(|v| (k, v)));
  let config = PostProcessConfig::from_pairs(pairs);
  let classes = ClassNames::load_or_index(&args.classes);

  let tensors = TensorFileInput::from_url(&args.tensors)?.into_tensors();
  let processor = PostProcessor::new(config, classes);

  let now = std::time::Instant::now();
  let objects = processor.process(&tensors)?;
  info!("后处理完成，耗时: {:.2?}, 检测到 {} 个物体", now.elapsed(), objects.len());

  let json = serde_json::to_string_pretty(&objects)?;
  match &args.output {
    Some(path) => {
      std::fs::write(path, json).with_context(|| format!("无法写入检测结果: {}", path.display()))?;
      info!("检测结果已保存: {}", path.display());
    }
    None => println!("{}", json),
  }

  Ok(())
}
