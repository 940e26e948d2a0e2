// 该文件是 Unodet （识牌） 项目的一部分。
// src/server.rs - 识牌 HTTP 服务
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

//! # HTTP 服务
//!
//! - `GET /` 用全黑 640x640 图像试跑一次模型，报告健康状态，始终返回 200
//! - `POST /detect` 识别 `{"image": "<前缀>,<base64>"}` 中的牌面，
//!   只返回置信度严格大于 0.7 的结果，保持模型输出顺序
//!
//! 模型在多个请求间共享，推理放在 actix 的阻塞线程池中执行。

use std::{fmt::Display, sync::Arc};

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, web};
use tracing::{debug, info, warn};

use crate::{
  card::CardLabel,
  frame::RgbFrame,
  model::{ClassId, DetectResult, Model, ScoreFilter},
};

mod error;
mod request;

pub use self::error::{ErrorBody, ServiceError};
pub use self::request::{
  DetectionResult, HealthReport, MalformedImage, decode_data_url, decode_request,
};

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost", "http://localhost:5173"];

/// 健康检查使用的探测图像边长
pub const HEALTH_PROBE_SIZE: u32 = 640;

// base64 图像通常远大于 actix 默认的 256 KiB
const MAX_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 服务可用的模型：输入 RGB 帧，输出原始类别编号，可跨线程共享
pub trait DetectModel:
  Model<Input = RgbFrame, Output = DetectResult<ClassId>, Error: Display> + Send + Sync + 'static
{
}

impl<M> DetectModel for M
where
  M: Model<Input = RgbFrame, Output = DetectResult<ClassId>> + Send + Sync + 'static,
  M::Error: Display,
{
}

pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  pub allowed_origins: Vec<String>,
  pub workers: Option<usize>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".to_string(),
      port: 8000,
      allowed_origins: DEFAULT_ALLOWED_ORIGINS.map(String::from).to_vec(),
      workers: None,
    }
  }
}

/// 只允许来自给定来源的 POST 跨域请求，允许任意请求头并携带凭据
pub fn cors(allowed_origins: &[String]) -> Cors {
  allowed_origins
    .iter()
    .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    .allowed_methods(vec!["POST"])
    .allow_any_header()
    .supports_credentials()
}

/// 注册 `/` 与 `/detect`，模型需以 `web::Data<M>` 形式提供
pub fn routes<M: DetectModel>(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
    .service(web::resource("/").route(web::get().to(health::<M>)))
    .service(web::resource("/detect").route(web::post().to(detect::<M>)));
}

async fn run_model<M: DetectModel>(
  model: web::Data<M>,
  frame: RgbFrame,
) -> Result<DetectResult<ClassId>, String> {
  let model = model.into_inner();
  web::block(move || model.infer(&frame).map_err(|e| e.to_string()))
    .await
    .map_err(|e| e.to_string())?
}

async fn health<M: DetectModel>(model: web::Data<M>) -> HttpResponse {
  let probe = RgbFrame::blank(HEALTH_PROBE_SIZE, HEALTH_PROBE_SIZE);
  let report = match run_model(model, probe).await {
    Ok(result) => {
      debug!("健康检查通过，检测数 {}", result.len());
      HealthReport::healthy()
    }
    Err(e) => {
      warn!("健康检查失败: {}", e);
      HealthReport::unhealthy(e)
    }
  };
  HttpResponse::Ok().json(report)
}

async fn detect<M: DetectModel>(
  model: web::Data<M>,
  body: web::Bytes,
) -> Result<HttpResponse, ServiceError> {
  let frame = decode_request(&body).inspect_err(|e| warn!("图像数据无效: {}", e))?;
  let (width, height) = (frame.width(), frame.height());

  let raw = run_model(model, frame).await.map_err(|e| {
    warn!("推理失败: {}", e);
    ServiceError::Inference(e)
  })?;
  let detections = raw
    .resolve_labels::<CardLabel>()
    .inspect_err(|e| warn!("{}", e))?
    .filter_score(ScoreFilter::DETECTION);

  debug!(
    "识别 {}x{} 图像，返回 {} 个结果",
    width,
    height,
    detections.len()
  );
  let body: Vec<DetectionResult> = detections.iter().map(DetectionResult::from).collect();
  Ok(HttpResponse::Ok().json(body))
}

/// 启动服务并阻塞直到退出
pub async fn serve<M: DetectModel>(model: M, config: ServerConfig) -> std::io::Result<()> {
  let model = web::Data::from(Arc::new(model));
  let origins = config.allowed_origins;
  info!("允许的跨域来源: {:?}", origins);

  let mut server = HttpServer::new(move || {
    App::new()
      .app_data(model.clone())
      .wrap(cors(&origins))
      .configure(routes::<M>)
  });
  if let Some(workers) = config.workers {
    server = server.workers(workers);
  }

  info!("监听 http://{}:{}", config.host, config.port);
  server.bind((config.host.as_str(), config.port))?.run().await
}
