//! Structural legs, swing labels, trend and break events

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::swings::{Swing, SwingKind};
use crate::config::StructureConfig;
use crate::types::{Bar, Direction, Trend};

/// Label of a swing relative to the previous swing of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwingLabel {
    #[serde(rename = "HH")]
    HigherHigh,
    #[serde(rename = "HL")]
    HigherLow,
    #[serde(rename = "LH")]
    LowerHigh,
    #[serde(rename = "LL")]
    LowerLow,
}

impl SwingLabel {
    pub fn direction(self) -> Direction {
        match self {
            SwingLabel::HigherHigh | SwingLabel::HigherLow => Direction::Bullish,
            SwingLabel::LowerHigh | SwingLabel::LowerLow => Direction::Bearish,
        }
    }

    fn classify(kind: SwingKind, price: f64, previous: f64) -> Self {
        match kind {
            SwingKind::High if price > previous => SwingLabel::HigherHigh,
            SwingKind::High => SwingLabel::LowerHigh,
            SwingKind::Low if price < previous => SwingLabel::LowerLow,
            SwingKind::Low => SwingLabel::HigherLow,
        }
    }
}

impl std::fmt::Display for SwingLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwingLabel::HigherHigh => write!(f, "HH"),
            SwingLabel::HigherLow => write!(f, "HL"),
            SwingLabel::LowerHigh => write!(f, "LH"),
            SwingLabel::LowerLow => write!(f, "LL"),
        }
    }
}

/// Move from one swing to the next swing of the opposite kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureLeg {
    pub start: Swing,
    pub end: Swing,
    pub direction: Direction,
    /// Label of the terminal swing; `None` for the first swing of its kind
    pub label: Option<SwingLabel>,
}

impl StructureLeg {
    pub fn amplitude(&self) -> f64 {
        (self.end.price - self.start.price).abs()
    }

    pub fn mid(&self) -> f64 {
        (self.end.price + self.start.price) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "BOS")]
    BreakOfStructure,
    #[serde(rename = "CHOCH")]
    ChangeOfCharacter,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::BreakOfStructure => write!(f, "BOS"),
            EventKind::ChangeOfCharacter => write!(f, "CHOCH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureEvent {
    pub kind: EventKind,
    pub direction: Direction,
    /// The swing level that was broken
    pub price: f64,
    /// First bar that closed beyond the level
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    /// Index of the triggering leg in `StructureState::legs`
    pub leg_index: usize,
    /// Amplitude of the triggering leg
    pub displacement: f64,
}

impl StructureEvent {
    pub fn is_choch(&self) -> bool {
        self.kind == EventKind::ChangeOfCharacter
    }
}

/// Compress consecutive same-kind swings to the most extreme one so the
/// sequence alternates high/low.
pub fn alternate(swings: &[Swing]) -> Vec<Swing> {
    let mut out: Vec<Swing> = Vec::with_capacity(swings.len());

    for swing in swings {
        match out.last_mut() {
            Some(last) if last.kind == swing.kind => {
                if swing.kind.beyond(swing.price, last.price) {
                    *last = swing.clone();
                }
            }
            _ => out.push(swing.clone()),
        }
    }

    out
}

/// Build labelled legs from raw swings
pub fn build_legs(swings: &[Swing]) -> Vec<StructureLeg> {
    let pivots = alternate(swings);
    let mut last_high: Option<f64> = None;
    let mut last_low: Option<f64> = None;
    let mut labels = Vec::with_capacity(pivots.len());

    for pivot in &pivots {
        let previous = match pivot.kind {
            SwingKind::High => last_high.replace(pivot.price),
            SwingKind::Low => last_low.replace(pivot.price),
        };
        labels.push(previous.map(|p| SwingLabel::classify(pivot.kind, pivot.price, p)));
    }

    pivots
        .windows(2)
        .zip(labels.into_iter().skip(1))
        .map(|(pair, label)| StructureLeg {
            start: pair[0].clone(),
            end: pair[1].clone(),
            direction: match pair[1].kind {
                SwingKind::High => Direction::Bullish,
                SwingKind::Low => Direction::Bearish,
            },
            label,
        })
        .collect()
}

/// Trend from the most recent labels. `None` when fewer than two labels exist.
pub fn infer_trend(labels: &[SwingLabel], window: usize) -> Option<Trend> {
    if labels.len() < 2 {
        return None;
    }

    let recent = &labels[labels.len().saturating_sub(window.max(2))..];
    let all = |direction: Direction| recent.iter().all(|l| l.direction() == direction);

    if all(Direction::Bullish) {
        Some(Trend::Up)
    } else if all(Direction::Bearish) {
        Some(Trend::Down)
    } else {
        Some(Trend::Range)
    }
}

pub fn leg_labels(legs: &[StructureLeg]) -> Vec<SwingLabel> {
    legs.iter().filter_map(|leg| leg.label).collect()
}

/// Walk the legs in order and emit BOS/CHOCH events.
///
/// A leg breaks structure when its terminal swing exceeds the previous swing
/// of the same kind, its amplitude clears `max(atr_multiple * atr,
/// pct_multiple * mid)` and at least one bar of the leg closes beyond the
/// broken level. The standing bias is the last CHOCH direction, else the
/// trend of the labels seen so far.
pub fn detect_events(
    bars: &[Bar],
    legs: &[StructureLeg],
    atr: f64,
    config: &StructureConfig,
) -> Vec<StructureEvent> {
    let mut events = Vec::new();
    let mut last_choch: Option<Direction> = None;
    let mut labels_so_far: Vec<SwingLabel> = Vec::new();

    for (leg_index, leg) in legs.iter().enumerate() {
        let prior = leg_index.checked_sub(1).map(|p| &legs[p].start);

        if let Some(prior) = prior {
            if let Some(event) = try_break(bars, leg, leg_index, prior, atr, config, last_choch, &labels_so_far) {
                if event.is_choch() {
                    last_choch = Some(event.direction);
                }
                events.push(event);
            }
        }

        if let Some(label) = leg.label {
            labels_so_far.push(label);
        }
    }

    events
}

#[allow(clippy::too_many_arguments)]
fn try_break(
    bars: &[Bar],
    leg: &StructureLeg,
    leg_index: usize,
    prior: &Swing,
    atr: f64,
    config: &StructureConfig,
    last_choch: Option<Direction>,
    labels_so_far: &[SwingLabel],
) -> Option<StructureEvent> {
    let level = prior.price;
    if !leg.end.kind.beyond(leg.end.price, level) {
        return None;
    }

    let threshold = (config.break_atr_multiple * atr).max(config.break_pct_multiple * leg.mid());
    if leg.amplitude() <= threshold {
        return None;
    }

    let closes_beyond = |bar: &Bar| match leg.direction {
        Direction::Bullish => bar.close > level,
        Direction::Bearish => bar.close < level,
    };
    let bar_index = (leg.start.index + 1..=leg.end.index).find(|&i| closes_beyond(&bars[i]))?;

    let standing = last_choch.or_else(|| {
        infer_trend(labels_so_far, config.trend_labels).and_then(Trend::direction)
    });
    let kind = match standing {
        Some(direction) if direction != leg.direction => EventKind::ChangeOfCharacter,
        _ => EventKind::BreakOfStructure,
    };

    Some(StructureEvent {
        kind,
        direction: leg.direction,
        price: level,
        timestamp: bars[bar_index].timestamp,
        bar_index,
        leg_index,
        displacement: leg.amplitude(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::swings::detect_swings;
    use crate::test_support::{bars_from_closes, ts};

    fn swing(index: usize, price: f64, kind: SwingKind) -> Swing {
        Swing {
            index,
            timestamp: ts(index as i64),
            price,
            kind,
            strength: 1,
        }
    }

    #[test]
    fn test_alternate_keeps_most_extreme() {
        let swings = vec![
            swing(1, 10.0, SwingKind::High),
            swing(3, 12.0, SwingKind::High),
            swing(5, 11.0, SwingKind::High),
            swing(7, 8.0, SwingKind::Low),
        ];
        let pivots = alternate(&swings);
        assert_eq!(pivots.len(), 2);
        assert_eq!(pivots[0].price, 12.0);
        assert_eq!(pivots[0].index, 3);
    }

    #[test]
    fn test_labels_and_trend() {
        let swings = vec![
            swing(0, 10.0, SwingKind::Low),
            swing(2, 15.0, SwingKind::High),
            swing(4, 12.0, SwingKind::Low),
            swing(6, 18.0, SwingKind::High),
            swing(8, 14.0, SwingKind::Low),
        ];
        let legs = build_legs(&swings);

        assert_eq!(legs.len(), 4);
        assert_eq!(legs[0].label, None);
        assert_eq!(legs[1].label, Some(SwingLabel::HigherLow));
        assert_eq!(legs[2].label, Some(SwingLabel::HigherHigh));
        assert_eq!(legs[3].label, Some(SwingLabel::HigherLow));
        assert_eq!(legs[2].direction, Direction::Bullish);

        let labels = leg_labels(&legs);
        assert_eq!(infer_trend(&labels, 3), Some(Trend::Up));
    }

    #[test]
    fn test_mixed_labels_are_range() {
        let labels = [SwingLabel::HigherHigh, SwingLabel::LowerLow, SwingLabel::HigherLow];
        assert_eq!(infer_trend(&labels, 3), Some(Trend::Range));
        assert_eq!(infer_trend(&labels[..1], 3), None);
    }

    #[test]
    fn test_break_above_prior_high_is_bos() {
        // up, pullback, break above 104 with a long leg
        let closes = [
            100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0, 101.0, 102.0, 104.0, 106.0, 108.0,
            107.0, 106.0, 105.0,
        ];
        let bars = bars_from_closes(&closes);
        let swings = detect_swings(&bars, 2, 4);
        let legs = build_legs(&swings);
        let events = detect_events(&bars, &legs, 1.0, &StructureConfig::default());

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, EventKind::BreakOfStructure);
        assert_eq!(event.direction, Direction::Bullish);
        assert_eq!(event.price, 104.25);
        // bar 10 is the first close above 104.25
        assert_eq!(event.bar_index, 10);
    }

    #[test]
    fn test_small_leg_does_not_break() {
        let closes = [
            100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0, 101.0, 102.0, 104.0, 106.0, 108.0,
            107.0, 106.0, 105.0,
        ];
        let bars = bars_from_closes(&closes);
        let legs = build_legs(&detect_swings(&bars, 2, 4));
        // leg amplitude is 7.5, a 10 ATR threshold filters it
        let events = detect_events(&bars, &legs, 10.0, &StructureConfig::default());
        assert!(events.is_empty());
    }
}
