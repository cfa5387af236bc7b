// 该文件是 Kuangtu （框图） 项目的一部分。
// src/task.rs - 消息循环任务
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

use std::fmt::Display;
use std::io::{BufRead, Write};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::node::Node;

/// 消息循环的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowSummary {
  pub handled: usize,
  pub failed: usize,
}

/// 逐行读取 JSON 消息交给节点处理，每个成功的请求写出一行回复
///
/// 单个请求失败只记录警告，不写回复，也不影响后续请求。输入结束后调用节点的 `shutdown`。
#[derive(Default, Debug)]
pub struct FlowTask {
  message_limit: Option<usize>,
}

impl FlowTask {
  pub fn with_message_limit(mut self, message_limit: Option<usize>) -> Self {
    self.message_limit = message_limit;
    self
  }

  pub fn run<R, W, N>(&self, input: R, node: &mut N, mut output: W) -> std::io::Result<FlowSummary>
  where
    R: BufRead,
    W: Write,
    N: Node,
    N::Error: Display,
  {
    info!("开始消息循环...");
    let mut summary = FlowSummary::default();

    for (line_no, line) in input.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      if self.message_limit.is_some_and(|n| summary.handled + summary.failed >= n) {
        info!("达到指定消息数量, 退出消息循环");
        break;
      }

      let message: Value = match serde_json::from_str(&line) {
        Ok(message) => message,
        Err(e) => {
          warn!("第 {} 行不是合法的 JSON 消息: {}", line_no + 1, e);
          summary.failed += 1;
          continue;
        }
      };

      let now = std::time::Instant::now();
      match node.handle_request(&message) {
        Ok(reply) => {
          serde_json::to_writer(&mut output, &reply)?;
          output.write_all(b"\n")?;
          output.flush()?;
          summary.handled += 1;
          debug!("第 {} 行处理完成，耗时: {:.2?}", line_no + 1, now.elapsed());
        }
        Err(e) => {
          warn!("第 {} 行处理失败: {}", line_no + 1, e);
          summary.failed += 1;
        }
      }
    }

    node.shutdown();
    info!(
      "消息循环结束: 成功 {} 条, 失败 {} 条",
      summary.handled, summary.failed
    );
    Ok(summary)
  }
}
