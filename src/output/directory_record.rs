// 该文件是 Unodet （识牌） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录标注帧
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

use std::{
  path::PathBuf,
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  output::{Render, draw::Draw},
  table::LiveOverlay,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体加载失败: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
}

/// 每帧保存为 `<root>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw<'static>,
  frame_counter: AtomicU32,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: Draw::new()?,
      frame_counter: AtomicU32::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:06}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbFrame, LiveOverlay> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbFrame, overlay: &LiveOverlay) -> Result<(), Self::Error> {
    let path = self.frame_path()?;
    self.draw.annotate(frame, overlay).save(&path)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
