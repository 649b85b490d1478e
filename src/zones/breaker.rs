//! Breaker blocks
//!
//! An order block (aligned with the bias standing at its own break, so
//! primary when it formed) turns into a breaker only when all three hold:
//! a liquidity sweep on its invalidation side close to the block, an
//! opposite break event after that sweep, and both inside the configured
//! delay. Anything less produces nothing.

use super::{lifecycle, stable_id, DetectionContext, Provenance, Zone, ZoneDetector, ZoneKind};
use crate::config::BreakerConfig;
use crate::error::Degraded;
use crate::liquidity::SweepEvent;
use crate::structure::StructureEvent;
use crate::types::{Direction, Role};

pub struct BreakerDetector;

impl ZoneDetector for BreakerDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::Breaker
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<Zone>, Degraded> {
        let atr = ctx.require_atr("zones.breaker")?;
        let config = &ctx.config.breaker;
        let mut zones = Vec::new();

        // Role is relative to the current bias, which the opposite break
        // itself may have flipped, so every block is a candidate
        let blocks = ctx.prior.iter().filter(|z| z.kind == ZoneKind::OrderBlock);

        for block in blocks {
            let paired = qualifying_sweeps(block, ctx.liquidity.sweeps(), config).find_map(|sweep| {
                find_opposite_break(block, sweep, &ctx.structure.events, atr, config)
                    .map(|(event_index, event)| (sweep, event_index, event))
            });
            let Some((sweep, event_index, event)) = paired else {
                continue;
            };

            let direction = block.direction.opposite();
            zones.push(Zone {
                id: stable_id(
                    ZoneKind::Breaker,
                    ctx.timeframe,
                    &format!("{}|{}|{}", block.id, sweep.timestamp.to_rfc3339(), event.timestamp.to_rfc3339()),
                ),
                kind: ZoneKind::Breaker,
                timeframe: ctx.timeframe.clone(),
                low: block.low,
                high: block.high,
                origin_time: event.timestamp,
                origin_index: event.bar_index,
                direction,
                role: Role::relative(direction, ctx.structure.bias),
                strength: 0.5 * block.strength + 0.5 * (event.displacement / (3.0 * atr)).min(1.0),
                status: lifecycle(ctx.bars, event.bar_index, block.low, block.high, direction),
                fill_pct: 0.0,
                provenance: vec![
                    Provenance::Zone {
                        id: block.id,
                        kind: ZoneKind::OrderBlock,
                    },
                    Provenance::Sweep {
                        level: sweep.level,
                        side: sweep.side,
                        time: sweep.timestamp,
                    },
                    Provenance::Event {
                        event: event.kind,
                        direction: event.direction,
                        event_index,
                        leg_index: event.leg_index,
                        event_time: event.timestamp,
                    },
                ],
            });
        }

        Ok(zones)
    }
}

/// Tolerance around the block's invalidation edge:
/// `max(span * span_ratio, anchor * pct)`
pub fn level_tolerance(block: &Zone, config: &BreakerConfig) -> f64 {
    let anchor = invalidation_edge(block);
    (block.span() * config.level_tolerance_span_ratio).max(anchor.abs() * config.level_tolerance_pct)
}

fn invalidation_edge(block: &Zone) -> f64 {
    match block.direction {
        Direction::Bullish => block.low,
        Direction::Bearish => block.high,
    }
}

/// Sweeps of the liquidity on the block's invalidation side, near its edge,
/// within `max_sweep_delay` bars of the block candle, oldest first
fn qualifying_sweeps<'a>(
    block: &'a Zone,
    sweeps: &'a [SweepEvent],
    config: &'a BreakerConfig,
) -> impl Iterator<Item = &'a SweepEvent> + 'a {
    let side = block.direction.opposite();
    let anchor = invalidation_edge(block);
    let tolerance = level_tolerance(block, config);

    sweeps.iter().filter(move |sweep| {
        sweep.side == side
            && sweep.bar_index > block.origin_index
            && sweep.bar_index - block.origin_index <= config.max_sweep_delay
            && (sweep.level - anchor).abs() <= tolerance
    })
}

/// First break against the block's direction after the sweep, within the
/// delay window, with enough displacement
fn find_opposite_break<'a>(
    block: &Zone,
    sweep: &SweepEvent,
    events: &'a [StructureEvent],
    atr: f64,
    config: &BreakerConfig,
) -> Option<(usize, &'a StructureEvent)> {
    let direction = block.direction.opposite();

    events.iter().enumerate().find(|(_, event)| {
        event.direction == direction
            && event.bar_index >= sweep.bar_index
            && event.bar_index - sweep.bar_index <= config.max_sweep_delay
            && event.displacement >= config.min_displacement_atr * atr
    })
}
