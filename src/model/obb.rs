// 该文件是 Unodet （识牌） 项目的一部分。
// src/model/obb.rs - 旋转框输出的前处理与后处理
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::RgbFrame,
  model::{ClassId, DetectItem, DetectResult},
};

const LETTERBOX_FILL: u8 = 114;
// cx, cy, w, h, angle
const OBB_BOX_CHANNELS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ObbDecodeError {
  #[error("unexpected output shape {0:?}")]
  UnexpectedShape(Vec<usize>),
  #[error("output length mismatch: expected {expected}, got {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 后处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObbParams {
  /// 置信度阈值
  pub conf: f32,
  /// NMS IOU 阈值
  pub iou: f32,
  /// 最多保留的检测数量
  pub max_det: usize,
}

impl Default for ObbParams {
  fn default() -> Self {
    Self {
      conf: 0.25,
      iou: 0.7,
      max_det: 300,
    }
  }
}

/// 等比缩放并居中填充到正方形输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub target: u32,
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub src_width: u32,
  pub src_height: u32,
}

impl Letterbox {
  pub fn fit(src_width: u32, src_height: u32, target: u32) -> Self {
    let scale = (target as f32 / src_width.max(1) as f32).min(target as f32 / src_height.max(1) as f32);
    let (new_w, new_h) = scaled_size(src_width, src_height, scale, target);
    Self {
      target,
      scale,
      pad_x: (target - new_w) / 2,
      pad_y: (target - new_h) / 2,
      src_width,
      src_height,
    }
  }

  /// 生成 NCHW、归一化到 [0, 1] 的输入张量数据
  pub fn tensor(&self, frame: &RgbFrame) -> Vec<f32> {
    let (new_w, new_h) = scaled_size(self.src_width, self.src_height, self.scale, self.target);
    let resized = imageops::resize(
      &frame.to_rgb_image(),
      new_w,
      new_h,
      imageops::FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(self.target, self.target, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);

    let plane = (self.target * self.target) as usize;
    let mut data = vec![0f32; plane * 3];
    for (idx, pixel) in canvas.pixels().enumerate() {
      for c in 0..3 {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    data
  }

  /// 将模型输入坐标还原到原图并裁剪到图像范围内
  pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.src_width as f32;
    let h = self.src_height as f32;
    let x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, w);
    let y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, h);
    [x(bbox[0]), y(bbox[1]), x(bbox[2]), y(bbox[3])]
  }
}

fn scaled_size(src_width: u32, src_height: u32, scale: f32, target: u32) -> (u32, u32) {
  let new_w = ((src_width as f32 * scale).round() as u32).clamp(1, target);
  let new_h = ((src_height as f32 * scale).round() as u32).clamp(1, target);
  (new_w, new_h)
}

/// 旋转框的轴对齐外接框 [x_min, y_min, x_max, y_max]
pub fn envelope(cx: f32, cy: f32, w: f32, h: f32, angle: f32) -> [f32; 4] {
  let (sin, cos) = angle.sin_cos();
  let half_w = 0.5 * (w * cos.abs() + h * sin.abs());
  let half_h = 0.5 * (w * sin.abs() + h * cos.abs());
  [cx - half_w, cy - half_h, cx + half_w, cy + half_h]
}

/// 解码 `[1, 4 + classes + 1, anchors]` 形状的旋转框输出
pub fn decode(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  params: &ObbParams,
) -> Result<DetectResult<ClassId>, ObbDecodeError> {
  let (channels, anchors) = match shape {
    [1, channels, anchors] if *channels > OBB_BOX_CHANNELS => (*channels, *anchors),
    _ => return Err(ObbDecodeError::UnexpectedShape(shape.to_vec())),
  };
  if data.len() != channels * anchors {
    return Err(ObbDecodeError::LengthMismatch {
      expected: channels * anchors,
      actual: data.len(),
    });
  }

  let classes = channels - OBB_BOX_CHANNELS;
  let at = |c: usize, i: usize| data[c * anchors + i];

  let mut candidates = Vec::new();
  for i in 0..anchors {
    let (class_id, score) = (0..classes)
      .map(|c| (c, at(4 + c, i)))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score < params.conf {
      continue;
    }

    let bbox = envelope(at(0, i), at(1, i), at(2, i), at(3, i), at(channels - 1, i));
    candidates.push(DetectItem {
      kind: class_id as ClassId,
      score,
      bbox: letterbox.restore(bbox),
    });
  }

  debug!("置信度过滤后候选框 {} 个", candidates.len());

  let mut items = nms(candidates, params.iou);
  items.truncate(params.max_det);

  debug!("检测到 {} 个物体", items.len());
  Ok(items.into_iter().collect())
}

/// 非极大值抑制，仅在同类别之间抑制，结果按置信度降序
fn nms(mut candidates: Vec<DetectItem<ClassId>>, iou_threshold: f32) -> Vec<DetectItem<ClassId>> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem<ClassId>> = Vec::new();
  for candidate in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.kind == candidate.kind && iou(&k.bbox, &candidate.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f32 = 1e-3;

  fn close(a: [f32; 4], b: [f32; 4]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < EPS)
  }

  /// 按锚点写入 `[1, 5 + classes, anchors]` 的列主序输出
  fn raw_output(classes: usize, anchors: &[([f32; 4], usize, f32, f32)]) -> (Vec<f32>, Vec<usize>) {
    let channels = 5 + classes;
    let n = anchors.len();
    let mut data = vec![0f32; channels * n];
    for (i, (bx, class, score, angle)) in anchors.iter().enumerate() {
      for c in 0..4 {
        data[c * n + i] = bx[c];
      }
      data[(4 + class) * n + i] = *score;
      data[(channels - 1) * n + i] = *angle;
    }
    (data, vec![1, channels, n])
  }

  #[test]
  fn letterbox_for_wide_frame() {
    let lb = Letterbox::fit(1280, 720, 640);
    assert!((lb.scale - 0.5).abs() < EPS);
    assert_eq!(lb.pad_x, 0);
    assert_eq!(lb.pad_y, 140);
    assert!(close(
      lb.restore([100.0, 190.0, 200.0, 240.0]),
      [200.0, 100.0, 400.0, 200.0]
    ));
  }

  #[test]
  fn letterbox_restore_clamps_to_image() {
    let lb = Letterbox::fit(640, 640, 640);
    assert!(close(
      lb.restore([-20.0, -5.0, 700.0, 650.0]),
      [0.0, 0.0, 640.0, 640.0]
    ));
  }

  #[test]
  fn letterbox_tensor_is_padded_nchw() {
    let frame = RgbFrame::blank(4, 2);
    let lb = Letterbox::fit(4, 2, 4);
    let data = lb.tensor(&frame);
    assert_eq!(data.len(), 3 * 16);
    let fill = LETTERBOX_FILL as f32 / 255.0;
    // 第一行为填充，第二行为原图
    assert!((data[0] - fill).abs() < EPS);
    assert!(data[4].abs() < EPS);
    assert!((data[16] - fill).abs() < EPS);
  }

  #[test]
  fn envelope_of_rotated_box() {
    assert!(close(envelope(50.0, 50.0, 20.0, 10.0, 0.0), [40.0, 45.0, 60.0, 55.0]));
    let quarter = std::f32::consts::FRAC_PI_2;
    assert!(close(envelope(50.0, 50.0, 20.0, 10.0, quarter), [45.0, 40.0, 55.0, 60.0]));
  }

  #[test]
  fn decode_filters_and_suppresses() {
    let (data, shape) = raw_output(
      15,
      &[
        ([100.0, 100.0, 40.0, 60.0], 3, 0.9, 0.0),
        ([102.0, 101.0, 40.0, 60.0], 3, 0.8, 0.0),
        ([102.0, 101.0, 40.0, 60.0], 7, 0.85, 0.0),
        ([400.0, 300.0, 40.0, 60.0], 14, 0.1, 0.0),
      ],
    );
    let lb = Letterbox::fit(640, 640, 640);
    let result = decode(&data, &shape, &lb, &ObbParams::default()).unwrap();

    let kinds: Vec<_> = result.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![3, 7]);
    assert!(close(result.items[0].bbox, [80.0, 70.0, 120.0, 130.0]));
  }

  #[test]
  fn decode_respects_max_det() {
    let (data, shape) = raw_output(
      2,
      &[
        ([10.0, 10.0, 5.0, 5.0], 0, 0.5, 0.0),
        ([100.0, 100.0, 5.0, 5.0], 1, 0.6, 0.0),
        ([200.0, 200.0, 5.0, 5.0], 0, 0.7, 0.0),
      ],
    );
    let lb = Letterbox::fit(640, 640, 640);
    let params = ObbParams {
      max_det: 2,
      ..ObbParams::default()
    };
    let result = decode(&data, &shape, &lb, &params).unwrap();
    let scores: Vec<_> = result.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.7, 0.6]);
  }

  #[test]
  fn decode_rejects_bad_shapes() {
    let lb = Letterbox::fit(640, 640, 640);
    let params = ObbParams::default();
    assert_eq!(
      decode(&[0.0; 10], &[1, 5, 2], &lb, &params),
      Err(ObbDecodeError::UnexpectedShape(vec![1, 5, 2]))
    );
    assert_eq!(
      decode(&[0.0; 10], &[1, 20, 2], &lb, &params),
      Err(ObbDecodeError::LengthMismatch {
        expected: 40,
        actual: 10
      })
    );
  }
}
