// 该文件是 Unodet （识牌） 项目的一部分。
// src/output/draw.rs - 牌桌叠加层绘制
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

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut},
  rect::Rect,
};

use crate::{
  frame::RgbFrame,
  model::{DetectItem, WithLabel},
  table::LiveOverlay,
};

const FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const DIVIDER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const PLAYER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const VERDICT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 24.0;
const LABEL_OFFSET: i32 = 10;
const PLAYER_FONT_SIZE: f32 = 48.0;
const VERDICT_FONT_SIZE: f32 = 32.0;
const DIVIDER_THICKNESS: u32 = 2;

// 文本坐标均为基线位置
const PLAYER_TEXT_X: i32 = 10;
const PLAYER_TEXT_STRIDE: i32 = 640;
const PLAYER_TEXT_Y: i32 = 50;
const VERDICT_TEXT_POS: (i32, i32) = (320, 360);

pub struct Draw<'a> {
  font: FontRef<'a>,
  label_scale: PxScale,
  player_scale: PxScale,
  verdict_scale: PxScale,
}

impl Draw<'static> {
  /// 使用内置的 DejaVuSans 字体
  pub fn new() -> Result<Self, InvalidFont> {
    Ok(Self {
      font: FontRef::try_from_slice(FONT_DATA)?,
      label_scale: PxScale::from(LABEL_FONT_SIZE),
      player_scale: PxScale::from(PLAYER_FONT_SIZE),
      verdict_scale: PxScale::from(VERDICT_FONT_SIZE),
    })
  }
}

impl Draw<'_> {
  pub fn annotate(&self, frame: &RgbFrame, overlay: &LiveOverlay) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_overlay(&mut image, overlay);
    image
  }

  pub fn draw_overlay(&self, image: &mut RgbImage, overlay: &LiveOverlay) {
    for item in overlay.detections.iter() {
      self.draw_card(image, item);
    }

    let bottom = image.height() as f32;
    for t in 0..DIVIDER_THICKNESS {
      let x = overlay.divider_x + t as f32;
      draw_line_segment_mut(image, (x, 0.0), (x, bottom), DIVIDER_COLOR);
    }

    for (i, line) in overlay.players.iter().enumerate() {
      let x = PLAYER_TEXT_X + i as i32 * PLAYER_TEXT_STRIDE;
      self.draw_text(image, PLAYER_COLOR, (x, PLAYER_TEXT_Y), self.player_scale, line);
    }

    self.draw_text(
      image,
      VERDICT_COLOR,
      VERDICT_TEXT_POS,
      self.verdict_scale,
      &overlay.verdict,
    );
  }

  fn draw_card<T: WithLabel>(&self, image: &mut RgbImage, item: &DetectItem<T>) {
    let [x1, y1, x2, y2] = item.bbox;
    let (x_min, y_min) = (x1.floor() as i32, y1.floor() as i32);
    let (x_max, y_max) = (x2.ceil() as i32, y2.ceil() as i32);

    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }

    self.draw_text(
      image,
      LABEL_COLOR,
      (x_min, y_min - LABEL_OFFSET),
      self.label_scale,
      &item.kind.to_label_str(),
    );
  }

  // imageproc 以文本左上角定位，这里换算为基线
  fn draw_text(
    &self,
    image: &mut RgbImage,
    color: Rgb<u8>,
    (x, baseline): (i32, i32),
    scale: PxScale,
    text: &str,
  ) {
    let top = baseline - scale.y.round() as i32;
    draw_text_mut(image, color, x, top, scale, &self.font, text);
  }
}
