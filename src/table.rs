// 该文件是 Unodet （识牌） 项目的一部分。
// src/table.rs - 牌桌区域与玩家状态
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

use std::{cmp::Ordering, fmt};

use tracing::debug;

use crate::{
  card::CardLabel,
  model::{DetectItem, DetectResult},
};

pub const DEFAULT_TABLE_WIDTH: f32 = 1280.0;
pub const DEFAULT_TABLE_HEIGHT: f32 = 720.0;

/// 玩家区域，左上与右下边界都包含在内
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRegion {
  pub name: String,
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl PlayerRegion {
  pub fn new(name: impl Into<String>, x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      name: name.into(),
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn contains(&self, x: f32, y: f32) -> bool {
    self.x_min <= x && x <= self.x_max && self.y_min <= y && y <= self.y_max
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
  /// 本次运行中分配给该玩家的全部牌，不做淘汰
  pub hand: Vec<CardLabel>,
  pub latest_card: Option<CardLabel>,
}

impl PlayerState {
  /// 最新牌面的文本形式，尚无牌时为空串
  pub fn latest_text(&self) -> String {
    self
      .latest_card
      .map(|card| card.to_string())
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison<'a> {
  Greater(&'a str),
  Equal,
  Incomparable,
}

impl fmt::Display for Comparison<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Comparison::Greater(name) => write!(f, "{} has the bigger number", name),
      Comparison::Equal => f.write_str("Both players have the same number"),
      Comparison::Incomparable => f.write_str("Cannot compare non-numeric cards"),
    }
  }
}

/// 两名玩家的牌桌。区域应互不重叠，重叠时按区域顺序取第一个匹配。
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
  seats: [(PlayerRegion, PlayerState); 2],
}

impl Default for Table {
  fn default() -> Self {
    Self::split(DEFAULT_TABLE_WIDTH, DEFAULT_TABLE_HEIGHT)
  }
}

impl Table {
  pub fn new(first: PlayerRegion, second: PlayerRegion) -> Self {
    Self {
      seats: [
        (first, PlayerState::default()),
        (second, PlayerState::default()),
      ],
    }
  }

  /// 将画面按宽度左右等分给 "Player 1" 与 "Player 2"
  pub fn split(width: f32, height: f32) -> Self {
    let middle = width / 2.0;
    Self::new(
      PlayerRegion::new("Player 1", 0.0, 0.0, middle, height),
      PlayerRegion::new("Player 2", middle, 0.0, width, height),
    )
  }

  pub fn regions(&self) -> impl Iterator<Item = &PlayerRegion> {
    self.seats.iter().map(|(region, _)| region)
  }

  pub fn players(&self) -> impl Iterator<Item = (&PlayerRegion, &PlayerState)> {
    self.seats.iter().map(|(region, state)| (region, state))
  }

  pub fn state(&self, seat: usize) -> Option<&PlayerState> {
    self.seats.get(seat).map(|(_, state)| state)
  }

  /// 左右区域的分界线横坐标
  pub fn divider_x(&self) -> f32 {
    self.seats[0].0.x_max
  }

  /// 查找包含该点的第一个区域
  pub fn seat_at(&self, x: f32, y: f32) -> Option<usize> {
    self.seats.iter().position(|(region, _)| region.contains(x, y))
  }

  /// 按检测框左上角分配玩家并更新其状态，区域外的检测返回 None
  pub fn observe(&mut self, item: &DetectItem<CardLabel>) -> Option<usize> {
    let [x1, y1, _, _] = item.bbox;
    let seat = self.seat_at(x1, y1)?;
    let (region, state) = &mut self.seats[seat];
    state.hand.push(item.kind);
    state.latest_card = Some(item.kind);
    debug!("{} 出牌 {}，共 {} 张", region.name, item.kind, state.hand.len());
    Some(seat)
  }

  pub fn compare(&self) -> Comparison<'_> {
    let [(first, a), (second, b)] = &self.seats;
    match (
      a.latest_card.and_then(|c| c.number()),
      b.latest_card.and_then(|c| c.number()),
    ) {
      (Some(x), Some(y)) => match x.cmp(&y) {
        Ordering::Greater => Comparison::Greater(&first.name),
        Ordering::Less => Comparison::Greater(&second.name),
        Ordering::Equal => Comparison::Equal,
      },
      _ => Comparison::Incomparable,
    }
  }
}

/// 一帧的叠加层内容：保留的检测、分界线、玩家状态行与比较结论
#[derive(Debug, Clone, PartialEq)]
pub struct LiveOverlay {
  pub detections: DetectResult<CardLabel>,
  pub divider_x: f32,
  pub players: Vec<String>,
  pub verdict: String,
}

impl Table {
  pub fn overlay(&self, detections: DetectResult<CardLabel>) -> LiveOverlay {
    LiveOverlay {
      detections,
      divider_x: self.divider_x(),
      players: self
        .players()
        .map(|(region, state)| format!("{}: {}", region.name, state.latest_text()))
        .collect(),
      verdict: self.compare().to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn card_at(kind: CardLabel, x: f32, y: f32) -> DetectItem<CardLabel> {
    DetectItem {
      kind,
      score: 0.9,
      bbox: [x, y, x + 50.0, y + 80.0],
    }
  }

  #[test]
  fn default_regions_split_the_frame() {
    let table = Table::default();
    let regions: Vec<_> = table.regions().cloned().collect();
    assert_eq!(regions[0], PlayerRegion::new("Player 1", 0.0, 0.0, 640.0, 720.0));
    assert_eq!(regions[1], PlayerRegion::new("Player 2", 640.0, 0.0, 1280.0, 720.0));
    assert_eq!(table.divider_x(), 640.0);
  }

  #[test]
  fn detections_are_assigned_by_top_left_corner() {
    let mut table = Table::default();
    assert_eq!(table.observe(&card_at(CardLabel::Number(3), 100.0, 100.0)), Some(0));
    assert_eq!(table.observe(&card_at(CardLabel::Skip, 700.0, 100.0)), Some(1));
    assert_eq!(table.observe(&card_at(CardLabel::Wild, 1300.0, 100.0)), None);

    assert_eq!(table.state(0).unwrap().hand, vec![CardLabel::Number(3)]);
    assert_eq!(table.state(1).unwrap().hand, vec![CardLabel::Skip]);
  }

  #[test]
  fn shared_edge_goes_to_the_first_region() {
    let table = Table::default();
    assert_eq!(table.seat_at(640.0, 0.0), Some(0));
    assert_eq!(table.seat_at(640.5, 720.0), Some(1));
    assert_eq!(table.seat_at(100.0, 720.5), None);
  }

  #[test]
  fn hand_grows_and_latest_card_follows() {
    let mut table = Table::default();
    for card in [CardLabel::Number(1), CardLabel::Reverse, CardLabel::Number(1)] {
      table.observe(&card_at(card, 10.0, 10.0));
    }
    let state = table.state(0).unwrap();
    assert_eq!(state.hand.len(), 3);
    assert_eq!(state.latest_text(), "1");
    assert_eq!(table.state(1).unwrap().latest_text(), "");
  }

  #[test]
  fn comparison_of_latest_cards() {
    let mut table = Table::default();
    table.observe(&card_at(CardLabel::Number(3), 100.0, 100.0));
    table.observe(&card_at(CardLabel::Number(7), 700.0, 100.0));
    assert_eq!(table.compare(), Comparison::Greater("Player 2"));
    assert_eq!(table.compare().to_string(), "Player 2 has the bigger number");

    table.observe(&card_at(CardLabel::Number(9), 100.0, 100.0));
    assert_eq!(table.compare(), Comparison::Greater("Player 1"));

    table.observe(&card_at(CardLabel::Number(5), 100.0, 100.0));
    table.observe(&card_at(CardLabel::Number(5), 700.0, 100.0));
    assert_eq!(table.compare().to_string(), "Both players have the same number");

    table.observe(&card_at(CardLabel::Wild, 100.0, 100.0));
    table.observe(&card_at(CardLabel::Number(4), 700.0, 100.0));
    assert_eq!(table.compare().to_string(), "Cannot compare non-numeric cards");
  }

  #[test]
  fn overlay_lines_follow_the_table() {
    let mut table = Table::default();
    let card = card_at(CardLabel::Number(8), 20.0, 30.0);
    table.observe(&card);

    let overlay = table.overlay([card].into_iter().collect());
    assert_eq!(overlay.players, vec!["Player 1: 8", "Player 2: "]);
    assert_eq!(overlay.verdict, "Cannot compare non-numeric cards");
    assert_eq!(overlay.divider_x, 640.0);
    assert_eq!(overlay.detections.len(), 1);
  }

  #[test]
  fn empty_table_cannot_compare() {
    assert_eq!(Table::default().compare(), Comparison::Incomparable);
  }
}
