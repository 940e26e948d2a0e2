// 该文件是 Unodet （识牌） 项目的一部分。
// src/input/image_directory.rs - 图像序列目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像: {0}")]
  Empty(String),
}

/// 按文件名顺序逐帧读取目录中的图像，读取失败即视为输入结束
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }

    let mut frames = Vec::new();
    for entry in std::fs::read_dir(url.path())? {
      let path = entry?.path();
      let is_frame = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if is_frame {
        frames.push(path);
      }
    }

    if frames.is_empty() {
      return Err(ImageDirectoryInputError::Empty(url.path().to_string()));
    }
    frames.sort();
    info!("目录 {} 中共有 {} 帧", url.path(), frames.len());

    Ok(ImageDirectoryInput {
      pending: frames.into(),
    })
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    match ImageReader::open(&path).map_err(image::ImageError::from).and_then(|r| r.decode()) {
      Ok(image) => Some(image.to_rgb8().into()),
      Err(e) => {
        error!("读取帧 {} 失败: {}", path.display(), e);
        self.pending.clear();
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn folder_url(dir: &std::path::Path) -> Url {
    Url::parse(&format!("folder://{}", dir.display())).unwrap()
  }

  #[test]
  fn frames_come_in_name_order() {
    let dir = std::env::temp_dir().join(format!("unodet-dir-input-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    RgbImage::from_pixel(2, 2, Rgb([2, 0, 0])).save(dir.join("0002.png")).unwrap();
    RgbImage::from_pixel(2, 2, Rgb([1, 0, 0])).save(dir.join("0001.png")).unwrap();
    std::fs::write(dir.join("notes.txt"), "skip me").unwrap();

    let input = ImageDirectoryInput::from_url(&folder_url(&dir)).unwrap();
    let reds: Vec<u8> = input.map(|f| f.to_rgb_image().get_pixel(0, 0)[0]).collect();
    assert_eq!(reds, vec![1, 2]);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn unreadable_frame_ends_the_stream() {
    let dir = std::env::temp_dir().join(format!("unodet-dir-broken-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    RgbImage::new(2, 2).save(dir.join("0001.png")).unwrap();
    std::fs::write(dir.join("0002.png"), b"not a png").unwrap();
    RgbImage::new(2, 2).save(dir.join("0003.png")).unwrap();

    let input = ImageDirectoryInput::from_url(&folder_url(&dir)).unwrap();
    assert_eq!(input.count(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn empty_directory_is_rejected() {
    let dir = std::env::temp_dir().join(format!("unodet-dir-empty-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    assert!(matches!(
      ImageDirectoryInput::from_url(&folder_url(&dir)),
      Err(ImageDirectoryInputError::Empty(_))
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
