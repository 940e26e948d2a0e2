// 该文件是 Unodet （识牌） 项目的一部分。
// src/model/yolo_obb.rs - YOLO 旋转框模型（ONNX Runtime）
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

use std::{collections::HashMap, sync::Mutex};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{
    ClassId, DetectResult, Model,
    obb::{Letterbox, ObbDecodeError, ObbParams, decode},
  },
};

const YOLO_OBB_INPUT_SIZE: u32 = 640;
const YOLO_OBB_MAX_INPUT_SIZE: u32 = 2048;
const YOLO_OBB_STRIDE: u32 = 32;
const YOLO_OBB_INTRA_THREADS: usize = 4;

/// ONNX Runtime 会话需要独占访问才能运行，因此放在互斥锁之后
pub struct YoloObb {
  session: Mutex<Session>,
  input_size: u32,
  params: ObbParams,
}

// 错误信息会出现在 HTTP 响应中，使用英文
#[derive(Error, Debug)]
pub enum YoloObbError {
  #[error("failed to read model file: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("ONNX Runtime error: {0}")]
  OrtError(#[from] ort::Error),
  #[error("invalid model url: {0}")]
  ModelPathError(String),
  #[error("model returned no output")]
  NoOutput,
  #[error("invalid model output: {0}")]
  BadOutput(#[from] ObbDecodeError),
  #[error("inference session lock is poisoned")]
  SessionPoisoned,
}

pub struct YoloObbBuilder {
  model_path: String,
  input_size: u32,
  intra_threads: usize,
  params: ObbParams,
}

impl FromUrlWithScheme for YoloObbBuilder {
  const SCHEME: &'static str = "yolo-obb";
}

impl FromUrl for YoloObbBuilder {
  type Error = YoloObbError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloObbError::ModelPathError(format!(
        "expected scheme '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    if url.path().is_empty() {
      return Err(YoloObbError::ModelPathError("model path is empty".to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let defaults = ObbParams::default();

    Ok(YoloObbBuilder {
      model_path: url.path().to_string(),
      input_size: query
        .get("size")
        .map(|v| input_size(v))
        .transpose()?
        .unwrap_or(YOLO_OBB_INPUT_SIZE),
      intra_threads: query
        .get("threads")
        .and_then(|v| v.parse().ok())
        .unwrap_or(YOLO_OBB_INTRA_THREADS),
      params: ObbParams {
        conf: query
          .get("conf")
          .and_then(|v| v.parse().ok())
          .unwrap_or(defaults.conf),
        iou: query
          .get("iou")
          .and_then(|v| v.parse().ok())
          .unwrap_or(defaults.iou),
        max_det: query
          .get("max_det")
          .and_then(|v| v.parse().ok())
          .unwrap_or(defaults.max_det),
      },
    })
  }
}

/// 输入边长须为 32 的正整数倍且不超过上限
fn input_size(value: &str) -> Result<u32, YoloObbError> {
  match value.parse::<u32>() {
    Ok(size) if size > 0 && size % YOLO_OBB_STRIDE == 0 && size <= YOLO_OBB_MAX_INPUT_SIZE => {
      Ok(size)
    }
    _ => {
      warn!("模型输入尺寸无效: {}", value);
      Err(YoloObbError::ModelPathError(format!(
        "size must be a multiple of {} in 1..={}, got '{}'",
        YOLO_OBB_STRIDE, YOLO_OBB_MAX_INPUT_SIZE, value
      )))
    }
  }
}

fn load_session(model_data: &[u8], intra_threads: usize) -> Result<Session, ort::Error> {
  let session = Session::builder()?
    .with_optimization_level(GraphOptimizationLevel::Level3)?
    .with_intra_threads(intra_threads)?
    .commit_from_memory(model_data)?;
  Ok(session)
}

impl YoloObbBuilder {
  pub fn build(self) -> Result<YoloObb, YoloObbError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = load_session(&model_data, self.intra_threads)?;
    info!(
      "模型加载完成，输入尺寸 {}，参数 {:?}",
      self.input_size, self.params
    );

    Ok(YoloObb {
      session: Mutex::new(session),
      input_size: self.input_size,
      params: self.params,
    })
  }
}

impl Model for YoloObb {
  type Input = RgbFrame;
  type Output = DetectResult<ClassId>;
  type Error = YoloObbError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let letterbox = Letterbox::fit(input.width(), input.height(), self.input_size);
    let size = self.input_size as usize;
    let input_tensor = Tensor::from_array(([1usize, 3, size, size], letterbox.tensor(input)))?;

    let (shape, data) = {
      let mut session = self
        .session
        .lock()
        .map_err(|_| YoloObbError::SessionPoisoned)?;

      debug!("执行模型推理");
      let outputs = session.run(ort::inputs![input_tensor])?;
      if outputs.len() == 0 {
        return Err(YoloObbError::NoOutput);
      }

      debug!("获取模型输出");
      let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
      let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      (shape, data.to_vec())
    };

    debug!("模型输出形状: {:?}", shape);
    Ok(decode(&data, &shape, &letterbox, &self.params)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_reads_query_parameters() {
    let url = Url::parse("yolo-obb:///models/uno-obb.onnx?conf=0.4&iou=0.5&size=1024&max_det=50")
      .unwrap();
    let builder = YoloObbBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/uno-obb.onnx");
    assert_eq!(builder.input_size, 1024);
    assert_eq!(builder.intra_threads, YOLO_OBB_INTRA_THREADS);
    assert_eq!(
      builder.params,
      ObbParams {
        conf: 0.4,
        iou: 0.5,
        max_det: 50
      }
    );
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("yolo26:///models/uno-obb.onnx").unwrap();
    assert!(matches!(
      YoloObbBuilder::from_url(&url),
      Err(YoloObbError::ModelPathError(_))
    ));
  }

  #[test]
  fn builder_rejects_unusable_input_sizes() {
    for size in ["0", "100", "4096", "-32", "big"] {
      let url = Url::parse(&format!("yolo-obb:///models/uno-obb.onnx?size={}", size)).unwrap();
      assert!(
        matches!(
          YoloObbBuilder::from_url(&url),
          Err(YoloObbError::ModelPathError(_))
        ),
        "size={} should be rejected",
        size
      );
    }

    for size in [32, 640, 2048] {
      let url = Url::parse(&format!("yolo-obb:///models/uno-obb.onnx?size={}", size)).unwrap();
      assert_eq!(YoloObbBuilder::from_url(&url).unwrap().input_size, size);
    }
  }

  #[test]
  fn error_messages_are_english() {
    let errors = [
      YoloObbError::NoOutput,
      YoloObbError::SessionPoisoned,
      YoloObbError::ModelPathError("model path is empty".to_string()),
      YoloObbError::BadOutput(ObbDecodeError::UnexpectedShape(vec![1, 2])),
      YoloObbError::BadOutput(ObbDecodeError::LengthMismatch {
        expected: 4,
        actual: 2,
      }),
    ];
    for error in errors {
      assert!(error.to_string().is_ascii(), "{}", error);
    }
  }

  #[test]
  fn missing_model_file_fails_to_load() {
    let url = Url::parse("yolo-obb:///nonexistent/uno-obb.onnx").unwrap();
    let result = YoloObbBuilder::from_url(&url).unwrap().build();
    assert!(matches!(result, Err(YoloObbError::ModelLoadError(_))));
  }
}
