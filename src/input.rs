// 该文件是 Unodet （识牌） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod image_directory;
pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Image directory input error: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

/// 帧来源。迭代结束（读取失败或数据耗尽）即表示输入结束，
/// 释放该值会同时释放底层资源。
pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ImageDirectory(ImageDirectoryInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      ImageDirectoryInput::SCHEME => Ok(InputWrapper::ImageDirectory(
        ImageDirectoryInput::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_input")]
      GStreamerInputPipelineBuilder::SCHEME => {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        Ok(InputWrapper::GStreamerInput(input))
      }
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::ImageDirectory(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
    }
  }
}
