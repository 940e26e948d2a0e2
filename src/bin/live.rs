// 该文件是 Unodet （识牌） 项目的一部分。
// src/bin/live.rs - 实时识牌演示入口
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
  input::InputWrapper,
  model::YoloObbBuilder,
  output::OutputWrapper,
  table::{DEFAULT_TABLE_HEIGHT, DEFAULT_TABLE_WIDTH, Table},
  task::{LiveTask, QuitSignal, Task},
};

/// UNO 双人比牌演示
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolo-obb:///models/uno-obb.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 gst://camera/dev/video0 或 folder:///frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 显示端，例如 gstdisplay:// 或 image:///tmp/latest.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 只保留置信度严格大于该值的检测，默认不过滤
  #[arg(long, value_name = "SCORE")]
  pub min_score: Option<f32>,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<usize>,

  /// 画面宽度，左右两半分给两名玩家
  #[arg(long, default_value_t = DEFAULT_TABLE_WIDTH)]
  pub width: f32,

  #[arg(long, default_value_t = DEFAULT_TABLE_HEIGHT)]
  pub height: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  validate_table()?;

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("显示端: {}", args.output);

  let model = YoloObbBuilder::from_url(&args.model)?.build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  LiveTask::new(Table::split(args.width, args.height), QuitSignal::install()?)
    .with_min_score(args.min_score)
    .with_frame_number(args.max_frames)
    .run_task(input, model, output)?;

  Ok(())
}
