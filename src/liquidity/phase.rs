//! Accumulation / manipulation / distribution phase
//!
//! Evaluated fresh on every snapshot in priority order. Nothing is carried
//! over between snapshots.

use serde::Serialize;

use super::magnets::LiquidityMagnet;
use super::pools::{LiquidityPool, SweepEvent};
use crate::config::LiquidityConfig;
use crate::structure::{atr::count_crosses, RangeState, StructureState, TradingRange};
use crate::types::{Bar, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Accumulation,
    Manipulation,
    Distribution,
    Unknown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Accumulation => write!(f, "ACCUMULATION"),
            Phase::Manipulation => write!(f, "MANIPULATION"),
            Phase::Distribution => write!(f, "DISTRIBUTION"),
            Phase::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A recent wick through an extreme of the active range that closed back inside
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSweep {
    pub side: Direction,
    pub bar_index: usize,
    pub level: f64,
    pub wick_ratio: f64,
}

pub struct PhaseInputs<'a> {
    pub bars: &'a [Bar],
    pub structure: &'a StructureState,
    pub pools: &'a [LiquidityPool],
    pub magnets: &'a [LiquidityMagnet],
    pub sweeps: &'a [SweepEvent],
}

/// Returns the phase and the reasons behind it
pub fn classify_phase(inputs: &PhaseInputs<'_>, config: &LiquidityConfig) -> (Phase, Vec<String>) {
    let mut reasons = Vec::new();
    let bar_count = inputs.bars.len();
    let recent_from = bar_count.saturating_sub(config.recent_bars.max(1));

    if let Some(range) = &inputs.structure.active_range {
        if let Some(sweep) = recent_range_sweep(inputs, range, recent_from, config) {
            reasons.push(format!(
                "range {} swept at bar {} with wick ratio {:.2}",
                if sweep.side == Direction::Bullish { "high" } else { "low" },
                sweep.bar_index,
                sweep.wick_ratio
            ));
            return (Phase::Manipulation, reasons);
        }
    }

    let trending = inputs.structure.trend.direction().is_some();
    let efficiency = inputs.structure.meta.drift_efficiency.unwrap_or(0.0);
    let new_pools = inputs
        .pools
        .iter()
        .filter(|p| p.first_index >= recent_from)
        .count();
    if trending
        && efficiency >= config.distribution_efficiency
        && new_pools == 0
        && !inputs.magnets.is_empty()
    {
        reasons.push(format!(
            "trend {} with drift efficiency {:.2} and no new pools in the last {} bars",
            inputs.structure.trend, efficiency, config.recent_bars
        ));
        return (Phase::Distribution, reasons);
    }

    if let Some(range) = &inputs.structure.active_range {
        let window = &inputs.bars[range.start_index..=range.end_index];
        let crosses = count_crosses(window, range.equilibrium);
        if range.state == RangeState::Inside && inputs.magnets.len() >= 2 && crosses >= 2 {
            reasons.push(format!(
                "inside range with {} magnets and {} equilibrium crosses",
                inputs.magnets.len(),
                crosses
            ));
            return (Phase::Accumulation, reasons);
        }
    }

    reasons.push("no phase condition met".to_string());
    (Phase::Unknown, reasons)
}

/// Latest strong-wick sweep of a range extreme among the recent bars.
///
/// A bar qualifies when its wick trades through the range high (low), it
/// closes back at or inside the extreme, and the wick beyond its body is at
/// least `strong_wick_ratio` of its range. Swing sweeps whose level sits at
/// a range extreme count the same way.
fn recent_range_sweep(
    inputs: &PhaseInputs<'_>,
    range: &TradingRange,
    recent_from: usize,
    config: &LiquidityConfig,
) -> Option<RangeSweep> {
    let tolerance = config.equal_level_tolerance_pct;
    let near = |a: f64, b: f64| (a - b).abs() <= tolerance * b.abs();

    let from_bars = (recent_from..inputs.bars.len()).rev().find_map(|i| {
        let bar = &inputs.bars[i];
        if bar.range() <= 0.0 {
            return None;
        }
        if bar.high > range.high && bar.close <= range.high {
            let ratio = bar.upper_wick() / bar.range();
            if ratio >= config.strong_wick_ratio {
                return Some(RangeSweep {
                    side: Direction::Bullish,
                    bar_index: i,
                    level: range.high,
                    wick_ratio: ratio,
                });
            }
        }
        if bar.low < range.low && bar.close >= range.low {
            let ratio = bar.lower_wick() / bar.range();
            if ratio >= config.strong_wick_ratio {
                return Some(RangeSweep {
                    side: Direction::Bearish,
                    bar_index: i,
                    level: range.low,
                    wick_ratio: ratio,
                });
            }
        }
        None
    });
    if from_bars.is_some() {
        return from_bars;
    }

    inputs
        .sweeps
        .iter()
        .rev()
        .filter(|s| s.bar_index >= recent_from && s.wick_ratio >= config.strong_wick_ratio)
        .find(|s| match s.side {
            Direction::Bullish => near(s.level, range.high),
            Direction::Bearish => near(s.level, range.low),
        })
        .map(|s| RangeSweep {
            side: s.side,
            bar_index: s.bar_index,
            level: s.level,
            wick_ratio: s.wick_ratio,
        })
}
