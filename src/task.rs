// 该文件是 Unodet （识牌） 项目的一部分。
// src/task.rs - 实时识牌任务
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

use std::{
  fmt::Display,
  io::BufRead,
  sync::mpsc::{self, Receiver, Sender},
  thread,
  time::{Duration, Instant},
};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::{
  card::CardLabel,
  frame::RgbFrame,
  model::{ClassId, DetectResult, Model, ScoreFilter},
  output::Render,
  table::{LiveOverlay, Table},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 退出请求。每处理完一帧检查一次。
pub struct QuitSignal {
  rx: Receiver<()>,
}

impl QuitSignal {
  /// 监听 Ctrl-C 以及标准输入中单独一行的 `q`
  pub fn install() -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = ctrlc_tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    thread::spawn(move || watch_quit_key(std::io::stdin().lock(), tx));

    info!("按 Ctrl-C 或输入 q 回车退出");
    Ok(Self { rx })
  }

  /// 由调用方持有发送端，发送任意消息即请求退出
  pub fn channel() -> (Sender<()>, Self) {
    let (tx, rx) = mpsc::channel();
    (tx, Self { rx })
  }

  fn requested(&self) -> bool {
    self.rx.try_recv().is_ok()
  }
}

fn watch_quit_key(reader: impl BufRead, tx: Sender<()>) {
  for line in reader.lines() {
    match line {
      Ok(line) if line.trim() == "q" => {
        info!("收到退出按键");
        let _ = tx.send(());
        return;
      }
      Ok(_) => {}
      Err(e) => {
        debug!("停止读取标准输入: {}", e);
        return;
      }
    }
  }
}

/// 逐帧识别牌面并分配给玩家区域。
///
/// 单帧的推理失败或未知类别只记录日志，该帧仍显示原始画面与当前玩家状态；
/// 显示失败同样只记录日志，不影响后续帧。
pub struct LiveTask {
  table: Table,
  filter: Option<ScoreFilter>,
  frame_number: Option<usize>,
  quit: QuitSignal,
}

impl LiveTask {
  pub fn new(table: Table, quit: QuitSignal) -> Self {
    Self {
      table,
      filter: None,
      frame_number: None,
      quit,
    }
  }

  pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
    self.filter = min_score.map(ScoreFilter::above);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  fn process<M>(&mut self, frame: &RgbFrame, model: &M) -> anyhow::Result<LiveOverlay>
  where
    M: Model<Input = RgbFrame, Output = DetectResult<ClassId>>,
    M::Error: Display,
  {
    let detections = model
      .infer(frame)
      .map_err(|e| anyhow!("推理失败: {}", e))?
      .resolve_labels::<CardLabel>()?;
    let detections = match self.filter {
      Some(filter) => detections.filter_score(filter),
      None => detections,
    };

    let kept: DetectResult<CardLabel> = detections
      .items
      .into_vec()
      .into_iter()
      .filter(|item| self.table.observe(item).is_some())
      .collect();
    Ok(self.table.overlay(kept))
  }
}

impl<I, M, O> Task<I, M, O> for LiveTask
where
  I: Iterator<Item = RgbFrame>,
  M: Model<Input = RgbFrame, Output = DetectResult<ClassId>>,
  M::Error: Display,
  O: Render<RgbFrame, LiveOverlay>,
  O::Error: Display,
{
  type Output = Table;
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");

    let mut frame_index = 0usize;
    for frame in input {
      frame_index += 1;
      let now = Instant::now();

      let overlay = self.process(&frame, &model).unwrap_or_else(|e| {
        warn!("第 {} 帧处理失败，仅显示原始画面: {}", frame_index, e);
        self.table.overlay(DetectResult::empty())
      });
      let elapsed = now.elapsed();
      if let Err(e) = output.render_result(&frame, &overlay) {
        warn!("第 {} 帧显示失败: {}", frame_index, e);
      }
      debug!(
        "第 {} 帧: {} 张牌, 推理耗时 {:.2?} / 总耗时 {:.2?}, {}",
        frame_index,
        overlay.detections.len(),
        elapsed,
        now.elapsed(),
        overlay.verdict
      );

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.quit.requested() {
        warn!("收到退出请求，退出任务循环");
        break;
      }
    }

    for (region, state) in self.table.players() {
      info!(
        "{}: 共 {} 张牌, 最新 {}",
        region.name,
        state.hand.len(),
        state
          .latest_card
          .map(|card| card.to_string())
          .unwrap_or_else(|| "无".to_string())
      );
    }
    info!("任务完成，共处理 {} 帧", frame_index);

    Ok(self.table)
  }
}
