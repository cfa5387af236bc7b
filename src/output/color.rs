// 该文件是 Kuangtu （框图） 项目的一部分。
// src/output/color.rs - 检测框颜色轮换
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

use image::Rgba;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
  pub name: &'static str,
  pub rgb: [u8; 3],
}

impl NamedColor {
  pub const fn new(name: &'static str, rgb: [u8; 3]) -> Self {
    Self { name, rgb }
  }

  pub fn rgba(&self) -> Rgba<u8> {
    let [r, g, b] = self.rgb;
    Rgba([r, g, b, 255])
  }
}

/// 默认调色板（CSS 颜色名）
pub const DEFAULT_PALETTE: [NamedColor; 5] = [
  NamedColor::new("Aqua", [0, 255, 255]),
  NamedColor::new("Coral", [255, 127, 80]),
  NamedColor::new("Cyan", [0, 255, 255]),
  NamedColor::new("Yellow", [255, 255, 0]),
  NamedColor::new("GreenYellow", [173, 255, 47]),
];

/// 按顺序轮换的颜色，每画一个框前进一格，到末尾后回到第一个
///
/// 游标属于单个绘制器实例，不在实例之间共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCycle {
  palette: Vec<NamedColor>,
  cursor: usize,
}

impl Default for ColorCycle {
  fn default() -> Self {
    Self {
      palette: DEFAULT_PALETTE.to_vec(),
      cursor: 0,
    }
  }
}

impl ColorCycle {
  /// 使用自定义调色板，空调色板回退到默认调色板
  pub fn with_palette(palette: Vec<NamedColor>) -> Self {
    if palette.is_empty() {
      warn!("调色板为空，使用默认调色板");
      return Self::default();
    }
    Self { palette, cursor: 0 }
  }

  /// 取出当前颜色并前进游标
  pub fn next_color(&mut self) -> NamedColor {
    let color = self.palette[self.cursor];
    self.cursor = (self.cursor + 1) % self.palette.len();
    color
  }

  pub fn peek(&self) -> NamedColor {
    self.palette[self.cursor]
  }

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn len(&self) -> usize {
    self.palette.len()
  }

  pub fn is_empty(&self) -> bool {
    self.palette.is_empty()
  }

  pub fn reset(&mut self) {
    self.cursor = 0;
  }
}
