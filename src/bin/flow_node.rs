// 该文件是 Kuangtu （框图） 项目的一部分。
// src/bin/flow_node.rs - 标准输入输出上的消息流节点
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

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use tracing::info;

use kuangtu::{
  node::{BBoxImageNode, PostObjectDetectionNode},
  task::FlowTask,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum NodeKind {
  /// 模型输出张量 -> 检测结果
  PostObjectDetection,
  /// 图像 + 检测结果 -> 绘制后的图像
  BboxImage,
}

/// 从标准输入逐行读取 JSON 消息，把回复逐行写到标准输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 节点类型
  #[arg(long, value_enum)]
  pub node: NodeKind,
  /// 节点配置，形如 key=value，可重复
  #[arg(long = "set", value_name = "KEY=VALUE")]
  pub settings: Vec<String>,
  /// 最多处理的消息数量（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_messages: usize,
}

fn parse_settings(settings: &[String]) -> Result<Vec<(String, String)>> {
  settings
    .iter()
    .map(|setting| {
      setting
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| anyhow!("配置项格式应为 key=value: {}", setting))
    })
    .collect()
}

fn main() -> Result<()> {
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = Args::parse();
  let settings = parse_settings(&args.settings)?;
  info!("节点类型: {:?}, 配置: {:?}", args.node, settings);

  let task = FlowTask::default()
    .with_message_limit((args.max_messages > 0).then_some(args.max_messages));
  let stdin = std::io::stdin().lock();
  let stdout = std::io::stdout().lock();

  let summary = match args.node {
    NodeKind::PostObjectDetection => {
      let mut node = PostObjectDetectionNode::from_pairs(settings);
      task.run(stdin, &mut node, stdout)?
    }
    NodeKind::BboxImage => {
      let mut node = BBoxImageNode::from_pairs(settings)?;
      task.run(stdin, &mut node, stdout)?
    }
  };

  info!("处理完成: 成功 {} 条, 失败 {} 条", summary.handled, summary.failed);

  Ok(())
}
