//! Active trading range

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RangeConfig;
use crate::error::Degraded;
use crate::types::Bar;

/// Where the latest close sits relative to the range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeState {
    Inside,
    DeviatedUp,
    DeviatedDown,
}

impl std::fmt::Display for RangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeState::Inside => write!(f, "INSIDE"),
            RangeState::DeviatedUp => write!(f, "DEVIATED_UP"),
            RangeState::DeviatedDown => write!(f, "DEVIATED_DOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingRange {
    pub high: f64,
    pub low: f64,
    pub equilibrium: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_index: usize,
    pub end_index: usize,
    pub state: RangeState,
}

impl TradingRange {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn bar_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Find the active range: the trailing `min_range_bars` bars before the
/// latest bar, extended backwards while earlier bars stay inside its bounds.
/// The latest close is classified against that window.
pub fn detect_range(bars: &[Bar], config: &RangeConfig) -> Result<TradingRange, Degraded> {
    let min_bars = config.min_range_bars.max(1);
    if bars.len() < min_bars + 1 {
        return Err(Degraded::InsufficientBars {
            stage: "range",
            needed: min_bars + 1,
            have: bars.len(),
        });
    }

    let last = bars.len() - 1;
    let end_index = last - 1;
    let mut start_index = last - min_bars;

    let window = &bars[start_index..=end_index];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    if high <= low {
        return Err(Degraded::NoActiveRange { stage: "range" });
    }

    let max_bars = config.max_range_bars.max(min_bars);
    while start_index > 0 && end_index + 1 - start_index < max_bars {
        let earlier = &bars[start_index - 1];
        if earlier.high > high || earlier.low < low {
            break;
        }
        start_index -= 1;
    }

    let close = bars[last].close;
    let state = if close > high {
        RangeState::DeviatedUp
    } else if close < low {
        RangeState::DeviatedDown
    } else {
        RangeState::Inside
    };

    Ok(TradingRange {
        high,
        low,
        equilibrium: (high + low) / 2.0,
        start: bars[start_index].timestamp,
        end: bars[end_index].timestamp,
        start_index,
        end_index,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bars_from_closes, ohlc_bars};

    fn config(min: usize) -> RangeConfig {
        RangeConfig {
            min_range_bars: min,
            max_range_bars: 50,
        }
    }

    #[test]
    fn test_inside_range() {
        let bars = bars_from_closes(&[100.0, 102.0, 100.0, 102.0, 100.0, 102.0, 101.0]);
        let range = detect_range(&bars, &config(4)).unwrap();

        assert_eq!(range.state, RangeState::Inside);
        assert_eq!(range.high, 102.25);
        assert_eq!(range.low, 99.75);
        assert_eq!(range.equilibrium, 101.0);
    }

    #[test]
    fn test_deviation_above() {
        let bars = bars_from_closes(&[100.0, 102.0, 100.0, 102.0, 100.0, 105.0]);
        let range = detect_range(&bars, &config(4)).unwrap();
        assert_eq!(range.state, RangeState::DeviatedUp);
    }

    #[test]
    fn test_window_extends_backwards() {
        let bars = ohlc_bars(&[
            (50.0, 60.0, 40.0, 50.0),
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
        ]);
        let range = detect_range(&bars, &config(2)).unwrap();
        // bars 3..=4 seed the window, bars 1 and 2 fit inside, bar 0 does not
        assert_eq!(range.start_index, 1);
        assert_eq!(range.end_index, 4);
        assert_eq!(range.bar_count(), 4);
    }

    #[test]
    fn test_too_few_bars_degrades() {
        let bars = bars_from_closes(&[100.0, 101.0]);
        assert!(matches!(
            detect_range(&bars, &config(4)),
            Err(Degraded::InsufficientBars { stage: "range", .. })
        ));
    }
}
