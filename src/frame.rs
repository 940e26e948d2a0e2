// 该文件是 Unodet （识牌） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
#[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct FrameSizeMismatch {
  pub expected: usize,
  pub actual: usize,
}

/// 按行紧密排列的 RGB 帧（HWC）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbFrame {
  /// 全零（黑色）帧
  pub fn blank(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * (width as usize) * (height as usize);
    Self {
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameSizeMismatch> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 长度在构造时已经校验
    RgbImage::from_raw(self.width, self.height, self.data.to_vec())
      .unwrap_or_else(|| RgbImage::new(self.width, self.height))
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn blank_frame_is_all_zero() {
    let image = RgbFrame::blank(640, 640).to_rgb_image();
    assert_eq!(image.dimensions(), (640, 640));
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn raw_length_is_checked() {
    let err = RgbFrame::from_raw(4, 2, vec![0; 10]).unwrap_err();
    assert_eq!(err.expected, 24);
    assert_eq!(err.actual, 10);
    assert!(RgbFrame::from_raw(4, 2, vec![0; 24]).is_ok());
  }

  #[test]
  fn image_conversion_keeps_pixels() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, Rgb([10, 20, 30]));
    let frame = RgbFrame::from(image.clone());
    assert_eq!(frame.width(), 3);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.to_rgb_image(), image);
  }
}
