//! Liquidity pool construction
//!
//! Pools above price (swing highs, range high, upper wicks) hold buy-side
//! liquidity and carry a bullish direction; pools below hold sell-side
//! liquidity and carry a bearish one. Role is relative to the structure bias.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::sweep_clusters;
use crate::config::LiquidityConfig;
use crate::structure::{StructureState, Swing, SwingKind, TradingRange};
use crate::types::{Bar, Bias, Direction, Role, SessionWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolKind {
    RangeExtreme,
    SessionExtreme,
    TrendLiquidity,
    EqualHighs,
    EqualLows,
    WickCluster,
    Sweep,
}

impl PoolKind {
    /// Lower value wins when a magnet picks its dominant type
    pub fn priority(self) -> u8 {
        match self {
            PoolKind::RangeExtreme => 0,
            PoolKind::SessionExtreme => 1,
            PoolKind::TrendLiquidity => 2,
            PoolKind::EqualHighs | PoolKind::EqualLows => 3,
            PoolKind::WickCluster => 4,
            PoolKind::Sweep => 5,
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::RangeExtreme => write!(f, "RANGE_EXTREME"),
            PoolKind::SessionExtreme => write!(f, "SESSION_EXTREME"),
            PoolKind::TrendLiquidity => write!(f, "TREND_LIQUIDITY"),
            PoolKind::EqualHighs => write!(f, "EQUAL_HIGHS"),
            PoolKind::EqualLows => write!(f, "EQUAL_LOWS"),
            PoolKind::WickCluster => write!(f, "WICK_CLUSTER"),
            PoolKind::Sweep => write!(f, "SWEEP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityPool {
    pub kind: PoolKind,
    pub price: f64,
    pub direction: Direction,
    pub role: Role,
    /// 0..=1
    pub strength: f64,
    pub touches: usize,
    pub first_touch: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
    pub first_index: usize,
    pub last_index: usize,
    /// Session name for session extremes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// A wick through a prior swing level followed by a close back on the
/// origin side (same bar or the next one)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepEvent {
    pub level: f64,
    /// Bullish: buy-side liquidity above was taken
    pub side: Direction,
    pub swing_index: usize,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Wick beyond the body as a fraction of the sweeping bar's range
    pub wick_ratio: f64,
    /// Bar that closed back on the origin side
    pub reclaim_index: usize,
}

impl SweepEvent {
    /// Direction price is expected to reverse towards
    pub fn reversal(&self) -> Direction {
        self.side.opposite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WickClusterInfo {
    pub price: f64,
    pub side: Direction,
    pub touches: usize,
    pub bar_indices: Vec<usize>,
}

fn side_of(kind: SwingKind) -> Direction {
    match kind {
        SwingKind::High => Direction::Bullish,
        SwingKind::Low => Direction::Bearish,
    }
}

fn recency(index: usize, bar_count: usize) -> f64 {
    if bar_count < 2 {
        1.0
    } else {
        index as f64 / (bar_count - 1) as f64
    }
}

/// Equal highs / equal lows: swing extremes within `tolerance` of each other
pub fn equal_level_pools(
    bars: &[Bar],
    swings: &[Swing],
    bias: Bias,
    config: &LiquidityConfig,
) -> Vec<LiquidityPool> {
    let mut pools = Vec::new();

    for kind in [SwingKind::High, SwingKind::Low] {
        let of_kind: Vec<&Swing> = swings.iter().filter(|s| s.kind == kind).collect();
        let clusters = sweep_clusters(of_kind, |s| s.price, config.equal_level_tolerance_pct);

        for cluster in clusters.into_iter().filter(|c| c.len() >= 2) {
            let price = match kind {
                SwingKind::High => cluster.iter().map(|s| s.price).fold(f64::MIN, f64::max),
                SwingKind::Low => cluster.iter().map(|s| s.price).fold(f64::MAX, f64::min),
            };
            let Some(first) = cluster.iter().min_by_key(|s| s.index) else {
                continue;
            };
            let Some(last) = cluster.iter().max_by_key(|s| s.index) else {
                continue;
            };
            let touches = cluster.len();
            let direction = side_of(kind);

            pools.push(LiquidityPool {
                kind: match kind {
                    SwingKind::High => PoolKind::EqualHighs,
                    SwingKind::Low => PoolKind::EqualLows,
                },
                price,
                direction,
                role: Role::relative(direction, bias),
                strength: (0.25 * touches as f64).min(1.0)
                    * (0.5 + 0.5 * recency(last.index, bars.len())),
                touches,
                first_touch: first.timestamp,
                last_touch: last.timestamp,
                first_index: first.index,
                last_index: last.index,
                session: None,
            });
        }
    }

    pools
}

/// The most recent swing against the bias: the last swing low in a bullish
/// bias, the last swing high in a bearish one. No pool without a bias.
pub fn trend_liquidity_pool(structure: &StructureState) -> Option<LiquidityPool> {
    let kind = match structure.bias {
        Bias::Bullish => SwingKind::Low,
        Bias::Bearish => SwingKind::High,
        Bias::Neutral => return None,
    };
    let swing = structure.last_swing(kind)?;
    let direction = side_of(kind);

    Some(LiquidityPool {
        kind: PoolKind::TrendLiquidity,
        price: swing.price,
        direction,
        role: Role::relative(direction, structure.bias),
        strength: (0.4 + 0.15 * swing.strength as f64).min(1.0),
        touches: 1,
        first_touch: swing.timestamp,
        last_touch: swing.timestamp,
        first_index: swing.index,
        last_index: swing.index,
        session: None,
    })
}

/// Both extremes of the active range. Touches count bars of the range
/// window that reach within tolerance of the extreme.
pub fn range_extreme_pools(
    bars: &[Bar],
    range: &TradingRange,
    bias: Bias,
    config: &LiquidityConfig,
) -> Vec<LiquidityPool> {
    let window = &bars[range.start_index..=range.end_index];
    let tolerance = config.equal_level_tolerance_pct;

    [(range.high, Direction::Bullish), (range.low, Direction::Bearish)]
        .into_iter()
        .filter_map(|(price, direction)| {
            let touching: Vec<usize> = window
                .iter()
                .enumerate()
                .filter(|(_, bar)| {
                    let extreme = match direction {
                        Direction::Bullish => bar.high,
                        Direction::Bearish => bar.low,
                    };
                    (extreme - price).abs() <= tolerance * price.abs()
                })
                .map(|(offset, _)| range.start_index + offset)
                .collect();
            let first_index = *touching.first()?;
            let last_index = *touching.last()?;

            Some(LiquidityPool {
                kind: PoolKind::RangeExtreme,
                price,
                direction,
                role: Role::relative(direction, bias),
                strength: 0.8,
                touches: touching.len(),
                first_touch: bars[first_index].timestamp,
                last_touch: bars[last_index].timestamp,
                first_index,
                last_index,
                session: None,
            })
        })
        .collect()
}

/// Scan bar by bar for stop runs through confirmed swing levels.
///
/// Only the first bar that trades through a level is considered: if it or
/// the next bar closes back on the origin side it is a sweep, otherwise the
/// level was simply broken.
pub fn detect_sweeps(bars: &[Bar], swings: &[Swing]) -> Vec<SweepEvent> {
    let mut sweeps = Vec::new();

    for swing in swings {
        let level = swing.price;
        let through = (swing.index + 1..bars.len()).find(|&j| match swing.kind {
            SwingKind::High => bars[j].high > level,
            SwingKind::Low => bars[j].low < level,
        });
        let Some(j) = through else {
            continue;
        };

        let closed_back = |bar: &Bar| match swing.kind {
            SwingKind::High => bar.close < level,
            SwingKind::Low => bar.close > level,
        };
        let reclaim_index = if closed_back(&bars[j]) {
            j
        } else if j + 1 < bars.len() && closed_back(&bars[j + 1]) {
            j + 1
        } else {
            continue;
        };

        let bar = &bars[j];
        let wick = match swing.kind {
            SwingKind::High => bar.upper_wick(),
            SwingKind::Low => bar.lower_wick(),
        };
        let wick_ratio = if bar.range() > 0.0 { wick / bar.range() } else { 0.0 };

        sweeps.push(SweepEvent {
            level,
            side: side_of(swing.kind),
            swing_index: swing.index,
            bar_index: j,
            timestamp: bar.timestamp,
            wick_ratio,
            reclaim_index,
        });
    }

    sweeps.sort_by_key(|s| (s.bar_index, s.swing_index));
    sweeps
}

pub fn sweep_pools(bars: &[Bar], sweeps: &[SweepEvent], bias: Bias) -> Vec<LiquidityPool> {
    sweeps
        .iter()
        .map(|sweep| LiquidityPool {
            kind: PoolKind::Sweep,
            price: sweep.level,
            direction: sweep.side,
            role: Role::relative(sweep.side, bias),
            strength: (0.3 + 0.5 * sweep.wick_ratio).min(1.0),
            touches: 1,
            first_touch: bars[sweep.swing_index].timestamp,
            last_touch: sweep.timestamp,
            first_index: sweep.swing_index,
            last_index: sweep.bar_index,
            session: None,
        })
        .collect()
}

/// Repeated long wicks at the same level
pub fn wick_clusters(bars: &[Bar], config: &LiquidityConfig) -> Vec<WickClusterInfo> {
    let mut clusters = Vec::new();

    for side in [Direction::Bullish, Direction::Bearish] {
        let tips: Vec<(usize, f64)> = bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| {
                let wick = match side {
                    Direction::Bullish => bar.upper_wick(),
                    Direction::Bearish => bar.lower_wick(),
                };
                bar.range() > 0.0 && wick / bar.range() >= config.wick_min_ratio
            })
            .map(|(i, bar)| match side {
                Direction::Bullish => (i, bar.high),
                Direction::Bearish => (i, bar.low),
            })
            .collect();

        for group in sweep_clusters(tips, |t| t.1, config.equal_level_tolerance_pct) {
            if group.len() < config.wick_cluster_min_touches {
                continue;
            }
            let price = match side {
                Direction::Bullish => group.iter().map(|t| t.1).fold(f64::MIN, f64::max),
                Direction::Bearish => group.iter().map(|t| t.1).fold(f64::MAX, f64::min),
            };
            let mut bar_indices: Vec<usize> = group.iter().map(|t| t.0).collect();
            bar_indices.sort_unstable();

            clusters.push(WickClusterInfo {
                price,
                side,
                touches: group.len(),
                bar_indices,
            });
        }
    }

    clusters
}

pub fn wick_cluster_pools(
    bars: &[Bar],
    clusters: &[WickClusterInfo],
    bias: Bias,
) -> Vec<LiquidityPool> {
    clusters
        .iter()
        .filter_map(|cluster| {
            let first_index = *cluster.bar_indices.first()?;
            let last_index = *cluster.bar_indices.last()?;
            Some(LiquidityPool {
                kind: PoolKind::WickCluster,
                price: cluster.price,
                direction: cluster.side,
                role: Role::relative(cluster.side, bias),
                strength: (0.2 * cluster.touches as f64).min(1.0),
                touches: cluster.touches,
                first_touch: bars[first_index].timestamp,
                last_touch: bars[last_index].timestamp,
                first_index,
                last_index,
                session: None,
            })
        })
        .collect()
}

/// High and low of the bars inside each supplied session window
pub fn session_pools(bars: &[Bar], sessions: &[SessionWindow], bias: Bias) -> Vec<LiquidityPool> {
    let mut pools = Vec::new();

    for session in sessions {
        let inside: Vec<(usize, &Bar)> = bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| session.contains(bar.timestamp))
            .collect();

        let high = inside
            .iter()
            .copied()
            .reduce(|best, cur| if cur.1.high > best.1.high { cur } else { best });
        let low = inside
            .iter()
            .copied()
            .reduce(|best, cur| if cur.1.low < best.1.low { cur } else { best });

        for (extreme, direction) in [(high, Direction::Bullish), (low, Direction::Bearish)] {
            let Some((index, bar)) = extreme else {
                continue;
            };
            pools.push(LiquidityPool {
                kind: PoolKind::SessionExtreme,
                price: match direction {
                    Direction::Bullish => bar.high,
                    Direction::Bearish => bar.low,
                },
                direction,
                role: Role::relative(direction, bias),
                strength: 0.7,
                touches: 1,
                first_touch: bar.timestamp,
                last_touch: bar.timestamp,
                first_index: index,
                last_index: index,
                session: Some(session.name.clone()),
            });
        }
    }

    pools
}
