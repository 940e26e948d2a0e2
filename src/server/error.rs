// 该文件是 Unodet （识牌） 项目的一部分。
// src/server/error.rs - HTTP 错误响应
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

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{card::UnknownClass, server::request::MalformedImage};

#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("Invalid image data: {0}")]
  MalformedImage(#[from] MalformedImage),
  #[error("Model produced an unknown class: {0}")]
  UnknownClass(#[from] UnknownClass),
  #[error("Inference failed: {0}")]
  Inference(String),
}

/// 错误响应体 `{"detail": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
  pub detail: String,
}

impl ResponseError for ServiceError {
  fn status_code(&self) -> StatusCode {
    match self {
      ServiceError::MalformedImage(_) => StatusCode::BAD_REQUEST,
      ServiceError::UnknownClass(_) | ServiceError::Inference(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    HttpResponse::build(self.status_code()).json(ErrorBody {
      detail: self.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_codes_follow_the_fault() {
    let bad = ServiceError::from(MalformedImage::NoSeparator);
    assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
      ServiceError::from(UnknownClass(15)).status_code(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
      ServiceError::Inference("boom".into()).status_code(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }
}
