// 该文件是 Unodet （识牌） 项目的一部分。
// src/model.rs - 模型
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

/// 检测模型。实现方需要保证 `infer` 可以在多个线程上同时调用。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for std::sync::Arc<M> {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 模型输出的原始类别编号
pub type ClassId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

pub trait WithLabel: Sized + std::fmt::Debug {
  type Error;
  fn to_label_str(&self) -> String;
  fn try_from_label_id(id: u32) -> Result<Self, Self::Error>;
}

/// `/detect` 的固定置信度阈值
pub const DETECTION_SCORE_THRESHOLD: f32 = 0.7;

/// 置信度过滤：仅保留严格大于阈值的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreFilter {
  threshold: f32,
}

impl ScoreFilter {
  pub const DETECTION: ScoreFilter = ScoreFilter {
    threshold: DETECTION_SCORE_THRESHOLD,
  };

  pub fn above(threshold: f32) -> Self {
    Self { threshold }
  }

  pub fn accepts(&self, score: f32) -> bool {
    score > self.threshold
  }
}

impl<T> DetectResult<T> {
  pub fn empty() -> Self {
    Self {
      items: Box::new([]),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem<T>> {
    self.items.iter()
  }

  /// 按置信度过滤，保持原有顺序
  pub fn filter_score(self, filter: ScoreFilter) -> Self {
    self
      .items
      .into_vec()
      .into_iter()
      .filter(|item| filter.accepts(item.score))
      .collect()
  }
}

impl DetectResult<ClassId> {
  /// 将类别编号解析为标签，任一编号无法解析即失败
  pub fn resolve_labels<T: WithLabel>(self) -> Result<DetectResult<T>, T::Error> {
    self
      .items
      .into_vec()
      .into_iter()
      .map(|item| {
        Ok(DetectItem {
          kind: T::try_from_label_id(item.kind)?,
          score: item.score,
          bbox: item.bbox,
        })
      })
      .collect()
  }
}

impl<T> Default for DetectResult<T> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<T> FromIterator<DetectItem<T>> for DetectResult<T> {
  fn from_iter<I: IntoIterator<Item = DetectItem<T>>>(iter: I) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}

impl<'a, T> IntoIterator for &'a DetectResult<T> {
  type Item = &'a DetectItem<T>;
  type IntoIter = std::slice::Iter<'a, DetectItem<T>>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

pub mod obb;

#[cfg(feature = "model_onnx")]
mod yolo_obb;
#[cfg(feature = "model_onnx")]
pub use self::yolo_obb::{YoloObb, YoloObbBuilder, YoloObbError};

#[cfg(test)]
mod tests {
  use super::*;
  use crate::card::{CardLabel, UnknownClass};

  fn item(kind: ClassId, score: f32) -> DetectItem<ClassId> {
    DetectItem {
      kind,
      score,
      bbox: [0.0, 0.0, 10.0, 10.0],
    }
  }

  #[test]
  fn filter_is_strictly_greater() {
    let just_above = f32::from_bits(DETECTION_SCORE_THRESHOLD.to_bits() + 1);
    let result: DetectResult<ClassId> = [
      item(0, DETECTION_SCORE_THRESHOLD),
      item(1, just_above),
      item(2, 0.5),
      item(3, 0.99),
    ]
    .into_iter()
    .collect();

    let kept = result.filter_score(ScoreFilter::DETECTION);
    let kinds: Vec<_> = kept.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![1, 3]);
  }

  #[test]
  fn filter_keeps_model_order() {
    let result: DetectResult<ClassId> = [item(5, 0.8), item(1, 0.95), item(9, 0.75)]
      .into_iter()
      .collect();
    let kept = result.filter_score(ScoreFilter::above(0.0));
    let kinds: Vec<_> = kept.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![5, 1, 9]);
  }

  #[test]
  fn labels_resolve_or_fail_as_a_whole() {
    let ok: DetectResult<ClassId> = [item(2, 0.9), item(14, 0.8)].into_iter().collect();
    let labels = ok.resolve_labels::<CardLabel>().unwrap();
    assert_eq!(labels.items[0].kind, CardLabel::DrawFour);
    assert_eq!(labels.items[1].kind, CardLabel::Number(9));

    let bad: DetectResult<ClassId> = [item(2, 0.9), item(15, 0.1)].into_iter().collect();
    assert_eq!(bad.resolve_labels::<CardLabel>(), Err(UnknownClass(15)));
  }
}
