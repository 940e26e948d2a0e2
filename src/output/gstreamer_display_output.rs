// 该文件是 Unodet （识牌） 项目的一部分。
// src/output/gstreamer_display_output.rs - GStreamer 屏幕显示输出
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

//! # GStreamer 显示输出
//!
//! `gstdisplay://?fps=30` 在本地窗口中显示标注后的画面（`autovideosink`）。
//! 画面尺寸取自第一帧，之后每帧尺寸必须保持一致。
//!
//! 使用前需要安装 GStreamer 开发库，并启用 `gstreamer_output` 特性。

use std::{
  collections::HashMap,
  sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
  },
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  output::{Render, draw::Draw},
  table::LiveOverlay,
};

const DEFAULT_FPS: u64 = 30;

#[derive(Error, Debug)]
pub enum GStreamerDisplayOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("字体加载失败: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
  #[error("帧尺寸变化: 期望 {expected:?}, 实际 {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

pub struct GStreamerDisplayOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  draw: Draw<'static>,
  fps: u64,
  frame_size: OnceLock<(u32, u32)>,
  frame_count: AtomicU64,
}

impl FromUrlWithScheme for GStreamerDisplayOutput {
  const SCHEME: &'static str = "gstdisplay";
}

impl FromUrl for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerDisplayOutputError::SchemeMismatch);
    }

    gst::init()?;

    let query: HashMap<_, _> = url.query_pairs().collect();
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u64>().ok())
      .filter(|fps| *fps > 0)
      .unwrap_or(DEFAULT_FPS);

    let description = "appsrc name=src is-live=true ! videoconvert ! autovideosink sync=false";
    info!("Creating display pipeline: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerDisplayOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerDisplayOutput {
      pipeline,
      appsrc,
      draw: Draw::new()?,
      fps,
      frame_size: OnceLock::new(),
      frame_count: AtomicU64::new(0),
    })
  }
}

impl Drop for GStreamerDisplayOutput {
  fn drop(&mut self) {
    if let Err(e) = self.appsrc.end_of_stream() {
      warn!("Failed to send EOS to display pipeline: {:?}", e);
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer display pipeline: {}", e);
    }

    info!(
      "显示输出已关闭，共显示 {} 帧",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

impl GStreamerDisplayOutput {
  fn ensure_caps(&self, width: u32, height: u32) -> Result<(), GStreamerDisplayOutputError> {
    let expected = *self.frame_size.get_or_init(|| {
      let caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(self.fps as i32, 1))
        .build();
      self.appsrc.set_caps(Some(&caps));
      info!("显示输出: {}x{} @ {} fps", width, height, self.fps);
      (width, height)
    });

    if expected != (width, height) {
      return Err(GStreamerDisplayOutputError::FrameSizeChanged {
        expected,
        actual: (width, height),
      });
    }
    Ok(())
  }

  fn push_frame(&self, data: Vec<u8>) -> Result<(), GStreamerDisplayOutputError> {
    let mut buffer = gst::Buffer::from_mut_slice(data);

    let index = self.frame_count.fetch_add(1, Ordering::Relaxed);
    let duration = 1_000_000_000 / self.fps;
    if let Some(buffer) = buffer.get_mut() {
      buffer.set_pts(gst::ClockTime::from_nseconds(index * duration));
      buffer.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerDisplayOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    Ok(())
  }
}

impl Render<RgbFrame, LiveOverlay> for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn render_result(&self, frame: &RgbFrame, overlay: &LiveOverlay) -> Result<(), Self::Error> {
    self.ensure_caps(frame.width(), frame.height())?;
    let annotated = self.draw.annotate(frame, overlay);
    self.push_frame(annotated.into_raw())
  }
}
