// 该文件是 Unodet （识牌） 项目的一部分。
// src/output/save_image_file.rs - 保存最新一帧到图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  output::{Render, draw::Draw},
  table::LiveOverlay,
};

/// 每帧覆盖写同一个文件，文件内容始终是最新的标注画面
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw<'static>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载失败: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      draw: Draw::new()?,
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<RgbFrame, LiveOverlay> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbFrame, overlay: &LiveOverlay) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    self.draw.annotate(frame, overlay).save(&self.path)?;
    debug!("保存图像到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::table::Table;

  #[test]
  fn latest_frame_overwrites_the_file() {
    let dir = std::env::temp_dir().join(format!("unodet-save-image-{}", std::process::id()));
    let path = dir.join("nested").join("latest.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    let overlay = Table::default().overlay(Default::default());
    output.render_result(&RgbFrame::blank(64, 48), &overlay).unwrap();
    output.render_result(&RgbFrame::blank(32, 24), &overlay).unwrap();

    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (32, 24));

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn other_schemes_are_rejected() {
    let url = Url::parse("folder:///tmp/frames").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
