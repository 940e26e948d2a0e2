// 该文件是 Unodet （识牌） 项目的一部分。
// src/card.rs - UNO 牌面标签
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

use std::fmt;

use thiserror::Error;

use crate::model::WithLabel;

/// UNO 牌面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardLabel {
  /// 数字牌 0-9
  Number(u8),
  DrawFour,
  DrawTwo,
  Reverse,
  Skip,
  Wild,
}

/// 类别编号到牌面的固定映射，下标即模型输出的类别编号
pub const CARD_LABELS: [CardLabel; 15] = [
  CardLabel::Number(0),
  CardLabel::Number(1),
  CardLabel::DrawFour,
  CardLabel::DrawTwo,
  CardLabel::Reverse,
  CardLabel::Skip,
  CardLabel::Wild,
  CardLabel::Number(2),
  CardLabel::Number(3),
  CardLabel::Number(4),
  CardLabel::Number(5),
  CardLabel::Number(6),
  CardLabel::Number(7),
  CardLabel::Number(8),
  CardLabel::Number(9),
];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("class id {0} is outside the {len}-entry label table", len = CARD_LABELS.len())]
pub struct UnknownClass(pub u32);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelTableError {
  #[error("标签表长度错误: 期望 15, 实际 {0}")]
  Length(usize),
  #[error("标签重复: {0}")]
  Duplicate(CardLabel),
  #[error("数字牌超出范围: {0}")]
  DigitOutOfRange(u8),
  #[error("缺少标签: {0}")]
  Missing(CardLabel),
}

/// 根据类别编号解析牌面
pub fn resolve(class_index: u32) -> Result<CardLabel, UnknownClass> {
  CARD_LABELS
    .get(class_index as usize)
    .copied()
    .ok_or(UnknownClass(class_index))
}

/// 启动时校验标签表：15 项互不重复，覆盖 0-9 以及全部功能牌
pub fn validate_table() -> Result<(), LabelTableError> {
  check_table(&CARD_LABELS)
}

fn check_table(table: &[CardLabel]) -> Result<(), LabelTableError> {
  if table.len() != 15 {
    return Err(LabelTableError::Length(table.len()));
  }

  for (idx, label) in table.iter().enumerate() {
    if let CardLabel::Number(n) = label
      && *n > 9
    {
      return Err(LabelTableError::DigitOutOfRange(*n));
    }
    if table[..idx].contains(label) {
      return Err(LabelTableError::Duplicate(*label));
    }
  }

  let required = (0..=9).map(CardLabel::Number).chain([
    CardLabel::DrawFour,
    CardLabel::DrawTwo,
    CardLabel::Reverse,
    CardLabel::Skip,
    CardLabel::Wild,
  ]);
  for label in required {
    if !table.contains(&label) {
      return Err(LabelTableError::Missing(label));
    }
  }

  Ok(())
}

impl CardLabel {
  /// 数字牌返回其数值，功能牌返回 None
  pub fn number(&self) -> Option<u8> {
    match self {
      CardLabel::Number(n) => Some(*n),
      _ => None,
    }
  }
}

impl fmt::Display for CardLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CardLabel::Number(n) => write!(f, "{}", n),
      CardLabel::DrawFour => f.write_str("+4"),
      CardLabel::DrawTwo => f.write_str("+2"),
      CardLabel::Reverse => f.write_str("reverse"),
      CardLabel::Skip => f.write_str("skip"),
      CardLabel::Wild => f.write_str("wild"),
    }
  }
}

impl WithLabel for CardLabel {
  type Error = UnknownClass;

  fn to_label_str(&self) -> String {
    self.to_string()
  }

  fn try_from_label_id(id: u32) -> Result<Self, Self::Error> {
    resolve(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_every_class_index() {
    let expected = [
      "0", "1", "+4", "+2", "reverse", "skip", "wild", "2", "3", "4", "5", "6", "7", "8", "9",
    ];
    for (idx, name) in expected.iter().enumerate() {
      assert_eq!(resolve(idx as u32).unwrap().to_string(), *name);
    }
  }

  #[test]
  fn rejects_out_of_range_index() {
    assert_eq!(resolve(15), Err(UnknownClass(15)));
    assert_eq!(resolve(u32::MAX), Err(UnknownClass(u32::MAX)));
  }

  #[test]
  fn builtin_table_is_valid() {
    assert_eq!(validate_table(), Ok(()));
  }

  #[test]
  fn broken_tables_are_reported() {
    assert_eq!(
      check_table(&CARD_LABELS[..14]),
      Err(LabelTableError::Length(14))
    );

    let mut dup = CARD_LABELS;
    dup[14] = CardLabel::Number(8);
    assert_eq!(
      check_table(&dup),
      Err(LabelTableError::Duplicate(CardLabel::Number(8)))
    );

    let mut wide = CARD_LABELS;
    wide[0] = CardLabel::Number(12);
    assert_eq!(
      check_table(&wide),
      Err(LabelTableError::DigitOutOfRange(12))
    );
  }

  #[test]
  fn only_digit_cards_have_numbers() {
    assert_eq!(CardLabel::Number(7).number(), Some(7));
    assert_eq!(CardLabel::Wild.number(), None);
    assert_eq!(CardLabel::DrawTwo.number(), None);
  }
}
