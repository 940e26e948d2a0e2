// 该文件是 Unodet （识牌） 项目的一部分。
// src/server/request.rs - 检测请求与响应体
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

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{card::CardLabel, frame::RgbFrame, model::DetectItem};

#[derive(Error, Debug)]
pub enum MalformedImage {
  #[error("request body is not valid JSON: {0}")]
  NotJson(#[from] serde_json::Error),
  #[error("field `image` is missing")]
  MissingField,
  #[error("field `image` must be a string")]
  NotAString,
  #[error("image data has no ',' separator")]
  NoSeparator,
  #[error("image payload is not valid base64: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("image bytes could not be decoded: {0}")]
  Decode(#[from] image::ImageError),
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
  image: Option<Value>,
}

/// 从请求体中取出 `image` 字段并解码为 RGB 帧。
///
/// 字段形如 `data:image/png;base64,<payload>`，逗号之前的部分不做校验。
pub fn decode_request(body: &[u8]) -> Result<RgbFrame, MalformedImage> {
  let request: DetectRequest = serde_json::from_slice(body)?;
  let data = match request.image {
    Some(Value::String(data)) => data,
    Some(_) => return Err(MalformedImage::NotAString),
    None => return Err(MalformedImage::MissingField),
  };
  decode_data_url(&data)
}

/// 负载中的 ASCII 空白（按行折断的 base64）会先被去除
pub fn decode_data_url(data: &str) -> Result<RgbFrame, MalformedImage> {
  let (_, payload) = data.split_once(',').ok_or(MalformedImage::NoSeparator)?;
  let payload: Vec<u8> = payload
    .bytes()
    .filter(|b| !b.is_ascii_whitespace())
    .collect();
  let bytes = STANDARD.decode(payload)?;
  let image = image::load_from_memory(&bytes)?;
  Ok(image.to_rgb8().into())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
  pub class_name: String,
  pub score: f32,
  /// [x1, y1, x2, y2]，原图像素坐标
  pub bbox: [f32; 4],
}

impl From<&DetectItem<CardLabel>> for DetectionResult {
  fn from(item: &DetectItem<CardLabel>) -> Self {
    Self {
      class_name: item.kind.to_string(),
      score: item.score,
      bbox: item.bbox,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
  pub status: String,
  pub message: String,
}

impl HealthReport {
  pub fn healthy() -> Self {
    Self {
      status: "healthy".to_string(),
      message: "YOLO model is loaded and functioning properly".to_string(),
    }
  }

  pub fn unhealthy(fault: impl std::fmt::Display) -> Self {
    Self {
      status: "unhealthy".to_string(),
      message: format!("Error occurred during health check: {}", fault),
    }
  }
}
