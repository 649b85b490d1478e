//! Swing (pivot) detection
//!
//! A bar is a swing high when its high is the maximum of the symmetric window
//! `[i - w, i + w]`, a swing low symmetrically on lows. Ties go to the
//! earliest bar. Only bars with a full window on both sides qualify, so the
//! last `w` bars can never be swings yet.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    fn price(self, bar: &Bar) -> f64 {
        match self {
            SwingKind::High => bar.high,
            SwingKind::Low => bar.low,
        }
    }

    /// True when `a` is strictly more extreme than `b` for this kind
    pub fn beyond(self, a: f64, b: f64) -> bool {
        match self {
            SwingKind::High => a > b,
            SwingKind::Low => a < b,
        }
    }
}

impl std::fmt::Display for SwingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwingKind::High => write!(f, "HIGH"),
            SwingKind::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Swing {
    /// Index into the analyzed bar slice
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: SwingKind,
    /// Number of window multiples the pivot stays extremal for (1..=cap)
    pub strength: u32,
}

/// Detect swings with window `window`, ordered by index.
///
/// A bar that is both a high and a low swing (outside bar) yields two swings:
/// the low first on a bullish bar, the high first on a bearish one.
pub fn detect_swings(bars: &[Bar], window: usize, strength_cap: u32) -> Vec<Swing> {
    if window == 0 || bars.len() < 2 * window + 1 {
        return Vec::new();
    }

    let mut swings = Vec::new();

    for i in window..bars.len() - window {
        let bar = &bars[i];
        let order = if bar.is_bullish() {
            [SwingKind::Low, SwingKind::High]
        } else {
            [SwingKind::High, SwingKind::Low]
        };

        for kind in order {
            if !is_extremal(bars, i, window, kind) {
                continue;
            }
            swings.push(Swing {
                index: i,
                timestamp: bar.timestamp,
                price: kind.price(bar),
                kind,
                strength: strength(bars, i, window, kind, strength_cap),
            });
        }
    }

    swings
}

/// Is bar `i` the (earliest) extreme of `[i - k, i + k]`?
fn is_extremal(bars: &[Bar], i: usize, k: usize, kind: SwingKind) -> bool {
    let pivot = kind.price(&bars[i]);

    // Earlier equal values win the tie
    let left_ok = bars[i - k..i]
        .iter()
        .all(|b| kind.beyond(pivot, kind.price(b)));
    let right_ok = bars[i + 1..=i + k]
        .iter()
        .all(|b| !kind.beyond(kind.price(b), pivot));

    left_ok && right_ok
}

fn strength(bars: &[Bar], i: usize, window: usize, kind: SwingKind, cap: u32) -> u32 {
    let mut strength = 1;

    for multiple in 2..=cap.max(1) {
        let k = window * multiple as usize;
        if i < k || i + k >= bars.len() {
            break;
        }
        if !is_extremal(bars, i, k, kind) {
            break;
        }
        strength = multiple;
    }

    strength
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bars_from_closes, ohlc_bars};

    #[test]
    fn test_peak_and_trough() {
        let bars = bars_from_closes(&[10.0, 11.0, 12.0, 11.0, 10.0, 9.0, 10.0, 11.0]);
        let swings = detect_swings(&bars, 2, 4);

        assert_eq!(swings.len(), 2);
        assert_eq!(swings[0].kind, SwingKind::High);
        assert_eq!(swings[0].index, 2);
        assert_eq!(swings[1].kind, SwingKind::Low);
        assert_eq!(swings[1].index, 5);
    }

    #[test]
    fn test_monotonic_series_has_no_swings() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        assert!(detect_swings(&bars, 2, 4).is_empty());
    }

    #[test]
    fn test_tie_goes_to_earliest() {
        let bars = ohlc_bars(&[
            (10.0, 10.5, 9.5, 10.0),
            (10.0, 10.5, 9.5, 10.0),
            (10.0, 12.0, 9.5, 11.0),
            (11.0, 12.0, 10.0, 10.5),
            (10.5, 10.8, 9.8, 10.0),
            (10.0, 10.5, 9.8, 10.2),
        ]);
        let highs: Vec<_> = detect_swings(&bars, 2, 4)
            .into_iter()
            .filter(|s| s.kind == SwingKind::High)
            .collect();

        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 2);
    }

    #[test]
    fn test_strength_grows_with_window() {
        // Single peak in the middle of 21 bars stays extremal for w = 2, 4, 6, 8
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        closes.push(120.0);
        closes.extend((0..10).map(|i| 109.0 - i as f64));
        let bars = bars_from_closes(&closes);

        let peak = detect_swings(&bars, 2, 4)
            .into_iter()
            .find(|s| s.kind == SwingKind::High)
            .unwrap();
        assert_eq!(peak.index, 10);
        assert_eq!(peak.strength, 4);
    }

    #[test]
    fn test_outside_bar_orders_low_first_when_bullish() {
        let bars = ohlc_bars(&[
            (10.0, 10.5, 9.5, 10.0),
            (10.0, 10.5, 9.5, 10.0),
            (10.0, 13.0, 7.0, 12.0),
            (11.0, 11.5, 9.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
        ]);
        let swings = detect_swings(&bars, 2, 4);

        assert_eq!(swings.len(), 2);
        assert_eq!(swings[0].kind, SwingKind::Low);
        assert_eq!(swings[1].kind, SwingKind::High);
        assert_eq!(swings[0].index, swings[1].index);
    }
}
