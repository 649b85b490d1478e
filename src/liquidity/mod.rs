//! Liquidity pipeline
//!
//! Pools (equal highs/lows, trend liquidity, range extremes, sweeps, wick
//! clusters, session extremes) → magnets → phase.

pub mod magnets;
pub mod phase;
pub mod pools;

pub use magnets::LiquidityMagnet;
pub use phase::Phase;
pub use pools::{LiquidityPool, PoolKind, SweepEvent, WickClusterInfo};

use serde::Serialize;
use tracing::debug;

use crate::config::LiquidityConfig;
use crate::structure::StructureState;
use crate::types::{Bar, MarketContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityMeta {
    pub tolerance_pct: f64,
    /// Stop-run provenance
    pub sweeps: Vec<SweepEvent>,
    pub wick_clusters: Vec<WickClusterInfo>,
    pub phase_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityState {
    pub pools: Vec<LiquidityPool>,
    pub magnets: Vec<LiquidityMagnet>,
    pub phase: Phase,
    pub meta: LiquidityMeta,
}

impl LiquidityState {
    pub fn sweeps(&self) -> &[SweepEvent] {
        &self.meta.sweeps
    }
}

/// Group items sorted by price. An item joins the current group while it is
/// within `tolerance_pct` of the group's first (lowest) price; the anchor
/// does not move, so groups never chain wider than the tolerance.
pub(crate) fn sweep_clusters<T>(
    mut items: Vec<T>,
    price: impl Fn(&T) -> f64,
    tolerance_pct: f64,
) -> Vec<Vec<T>> {
    items.sort_by(|a, b| price(a).total_cmp(&price(b)));

    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut anchor = f64::NAN;

    for item in items {
        let p = price(&item);
        match groups.last_mut() {
            Some(group) if (p - anchor).abs() <= tolerance_pct * anchor.abs() => group.push(item),
            _ => {
                anchor = p;
                groups.push(vec![item]);
            }
        }
    }

    groups
}

/// Run stage 5 over the same bar slice the structure was computed on
pub fn analyze_liquidity(
    bars: &[Bar],
    structure: &StructureState,
    context: &MarketContext,
    config: &LiquidityConfig,
) -> LiquidityState {
    let bias = structure.bias;

    let mut all_pools = pools::equal_level_pools(bars, &structure.swings, bias, config);
    all_pools.extend(pools::trend_liquidity_pool(structure));
    if let Some(range) = &structure.active_range {
        all_pools.extend(pools::range_extreme_pools(bars, range, bias, config));
    }

    let sweeps = pools::detect_sweeps(bars, &structure.swings);
    all_pools.extend(pools::sweep_pools(bars, &sweeps, bias));

    let wick_clusters = pools::wick_clusters(bars, config);
    all_pools.extend(pools::wick_cluster_pools(bars, &wick_clusters, bias));

    all_pools.extend(pools::session_pools(bars, &context.sessions, bias));

    all_pools.sort_by(|a, b| a.price.total_cmp(&b.price).then(a.kind.cmp(&b.kind)));

    let magnets = magnets::aggregate_magnets(
        &all_pools,
        config.equal_level_tolerance_pct,
        config.max_primary_magnets,
    );

    let (phase, phase_reasons) = phase::classify_phase(
        &phase::PhaseInputs {
            bars,
            structure,
            pools: &all_pools,
            magnets: &magnets,
            sweeps: &sweeps,
        },
        config,
    );

    debug!(
        "liquidity: {} pools, {} magnets, {} sweeps, phase {}",
        all_pools.len(),
        magnets.len(),
        sweeps.len(),
        phase
    );

    LiquidityState {
        pools: all_pools,
        magnets,
        phase,
        meta: LiquidityMeta {
            tolerance_pct: config.equal_level_tolerance_pct,
            sweeps,
            wick_clusters,
            phase_reasons,
        },
    }
}
