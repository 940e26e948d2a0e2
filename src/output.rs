// 该文件是 Unodet （识牌） 项目的一部分。
// src/output.rs - 标注画面输出
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, table::LiveOverlay};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display_output::{GStreamerDisplayOutput, GStreamerDisplayOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 显示输出错误: {0}")]
  GStreamerDisplayOutputError(#[from] GStreamerDisplayOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 显示端。释放该值会同时释放底层资源。
pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerDisplayOutput(GStreamerDisplayOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_output")]
      GStreamerDisplayOutput::SCHEME => Ok(OutputWrapper::GStreamerDisplayOutput(
        GStreamerDisplayOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<RgbFrame, LiveOverlay> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbFrame, overlay: &LiveOverlay) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, overlay)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, overlay)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplayOutput(output) => output
        .render_result(frame, overlay)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheme_selects_the_sink() {
    let url = Url::parse("image:///tmp/unodet-latest.png").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::SaveImageFileOutput(_))
    ));

    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
