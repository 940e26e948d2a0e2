// 该文件是 Unodet （识牌） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 摄像头/视频输入
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

//! # GStreamer 输入
//!
//! 支持两种 URL：
//!
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30` 读取 V4L2 摄像头
//! - `gst://file/path/to/video.mp4` 读取视频文件
//!
//! 管道末端统一转换为 RGB，由 appsink 取帧。拉取失败（包括流结束）时迭代结束。
//!
//! 使用前需要安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

enum SourceItem {
  File(String),
  Camera {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
  },
}

impl SourceItem {
  fn to_pipeline(&self) -> String {
    match self {
      SourceItem::File(path) => format!("filesrc location={} ! decodebin", path),
      SourceItem::Camera {
        device,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        device, width, height, fps
      ),
    }
  }
}

pub struct GStreamerInputPipelineBuilder {
  source: SourceItem,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let number = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let source = match url.host_str() {
      Some("camera") => SourceItem::Camera {
        device: url.path().to_string(),
        width: number("width", DEFAULT_CAMERA_WIDTH),
        height: number("height", DEFAULT_CAMERA_HEIGHT),
        fps: number("fps", DEFAULT_CAMERA_FPS),
      },
      Some("file") => SourceItem::File(url.path().to_string()),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    Ok(GStreamerInputPipelineBuilder { source })
  }
}

impl GStreamerInputPipelineBuilder {
  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = format!(
      "{} ! videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true name=sink",
      self.source.to_pipeline()
    );
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    } else {
      info!("GStreamer 输入已释放");
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self
      .appsink
      .pull_sample()
      .map_err(|e| {
        info!("Failed to pull sample (end of stream?): {}", e);
        e
      })
      .ok()?;

    convert_sample(sample)
      .map_err(|e| {
        error!("Failed to fetch sample: {}", e);
        e
      })
      .ok()
  }
}

fn convert_sample(sample: gst::Sample) -> Result<RgbFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 逐行拷贝，去掉行尾对齐填充
  let row = width * 3;
  let mut pixels = Vec::with_capacity(row * height);
  for y in 0..height {
    let start = y * stride;
    let line = data.get(start..start + row).ok_or_else(|| {
      GStreamerInputError::PipelineError(format!("Buffer too small for row {}", y))
    })?;
    pixels.extend_from_slice(line);
  }

  RgbFrame::from_raw(width as u32, height as u32, pixels)
    .map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
}
