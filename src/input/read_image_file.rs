// 该文件是 Unodet （识牌） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图片，只产生一帧
pub struct ImageFileInput {
  image: Option<RgbFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!("读取图片 {}: {}x{}", path, image.width(), image.height());

    Ok(ImageFileInput {
      image: Some(image.into()),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn yields_the_image_once() {
    let dir = std::env::temp_dir().join(format!("unodet-image-input-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("card.png");
    RgbImage::new(12, 8).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (12, 8));
    assert!(input.next().is_none());

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let url = Url::parse("image:///nonexistent/unodet/card.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
