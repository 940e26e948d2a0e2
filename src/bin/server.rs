// 该文件是 Unodet （识牌） 项目的一部分。
// src/bin/server.rs - 识牌 HTTP 服务入口
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use unodet::{
  FromUrl,
  card::validate_table,
  model::YoloObbBuilder,
  server::{DEFAULT_ALLOWED_ORIGINS, ServerConfig, serve},
};

/// UNO 识牌 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolo-obb:///models/uno-obb.onnx?conf=0.25
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  #[arg(long, default_value = "127.0.0.1")]
  pub host: String,

  #[arg(long, default_value_t = 8000)]
  pub port: u16,

  /// 允许跨域访问 /detect 的来源，可重复或以逗号分隔
  #[arg(
    long = "allowed-origin",
    env = "UNO_ALLOWED_ORIGINS",
    value_delimiter = ',',
    default_values = DEFAULT_ALLOWED_ORIGINS
  )]
  pub allowed_origins: Vec<String>,

  /// HTTP 工作线程数，默认与 CPU 核数相同
  #[arg(long)]
  pub workers: Option<usize>,
}

#[actix_web::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  validate_table()?;

  info!("模型地址: {}", args.model);
  let model = YoloObbBuilder::from_url(&args.model)?.build()?;
  info!("模型加载完成");

  serve(
    model,
    ServerConfig {
      host: args.host,
      port: args.port,
      allowed_origins: args.allowed_origins,
      workers: args.workers,
    },
  )
  .await?;

  Ok(())
}
