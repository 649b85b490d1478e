//! Order blocks: the last opposing candle before a structural break

use super::{lifecycle, stable_id, DetectionContext, Provenance, Zone, ZoneDetector, ZoneKind};
use crate::error::Degraded;
use crate::types::{Bar, Direction, Role};

pub struct OrderBlockDetector;

impl ZoneDetector for OrderBlockDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::OrderBlock
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<Zone>, Degraded> {
        let atr = ctx.require_atr("zones.order_block")?;
        let config = &ctx.config.order_block;
        let bars = ctx.bars;
        let mut zones: Vec<Zone> = Vec::new();

        for (event_index, event) in ctx.structure.events.iter().enumerate() {
            let Some(candle_index) = find_candle(bars, event.bar_index, event.direction, ctx) else {
                continue;
            };
            let candle = &bars[candle_index];

            let (low, high) = if candle.body_ratio() >= config.body_domination_pct {
                (candle.body_low(), candle.body_high())
            } else {
                (candle.low, candle.high)
            };

            let id = stable_id(
                ZoneKind::OrderBlock,
                ctx.timeframe,
                &format!("{}|{}", candle.timestamp.to_rfc3339(), event.direction),
            );
            if zones.iter().any(|z| z.id == id) {
                continue;
            }

            zones.push(Zone {
                id,
                kind: ZoneKind::OrderBlock,
                timeframe: ctx.timeframe.clone(),
                low,
                high,
                origin_time: candle.timestamp,
                origin_index: candle_index,
                direction: event.direction,
                role: Role::relative(event.direction, ctx.structure.bias),
                strength: 0.4 + 0.6 * (event.displacement / (3.0 * atr)).min(1.0),
                status: lifecycle(bars, event.bar_index, low, high, event.direction),
                fill_pct: 0.0,
                provenance: vec![Provenance::Event {
                    event: event.kind,
                    direction: event.direction,
                    event_index,
                    leg_index: event.leg_index,
                    event_time: event.timestamp,
                }],
            });
        }

        Ok(zones)
    }
}

/// Last candle opposite to `direction` before the break bar, within the
/// prelude window, whose body is at least `body_min_pct` of its range
fn find_candle(
    bars: &[Bar],
    break_index: usize,
    direction: Direction,
    ctx: &DetectionContext<'_>,
) -> Option<usize> {
    let config = &ctx.config.order_block;
    let earliest = break_index.saturating_sub(config.prelude_max_bars);

    (earliest..break_index).rev().find(|&i| {
        let bar = &bars[i];
        let opposite = match direction {
            Direction::Bullish => bar.close < bar.open,
            Direction::Bearish => bar.close > bar.open,
        };
        opposite && bar.body_ratio() >= config.body_min_pct
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::liquidity::analyze_liquidity;
    use crate::structure::{analyze_structure, EventKind, StructureEvent};
    use crate::test_support::ohlc_bars;
    use crate::types::{MarketContext, Timeframe};
    use crate::zones::ZoneStatus;

    fn impulse_bars() -> Vec<Bar> {
        ohlc_bars(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 101.5, 100.0, 101.0),
            (101.0, 101.2, 99.6, 99.8),
            (99.8, 100.0, 98.0, 98.5),
            (98.5, 103.0, 98.4, 102.8),
            (102.8, 106.0, 102.5, 105.5),
            (105.5, 106.5, 105.0, 106.0),
        ])
    }

    #[test]
    fn test_block_spans_last_bearish_body() {
        let bars = impulse_bars();
        let config = AnalysisConfig::default();
        let mut structure = analyze_structure(&bars, &config);
        structure.meta.atr = Some(1.0);
        structure.events = vec![StructureEvent {
            kind: EventKind::BreakOfStructure,
            direction: Direction::Bullish,
            price: 101.5,
            timestamp: bars[4].timestamp,
            bar_index: 4,
            leg_index: 0,
            displacement: 8.0,
        }];
        structure.bias = crate::types::Bias::Bullish;
        let liquidity = analyze_liquidity(&bars, &structure, &MarketContext::default(), &config.liquidity);
        let tf = Timeframe::from("5m");
        let ctx = DetectionContext {
            bars: &bars,
            structure: &structure,
            liquidity: &liquidity,
            timeframe: &tf,
            config: &config.zones,
            prior: &[],
        };

        let zones = OrderBlockDetector.detect(&ctx).unwrap();
        assert_eq!(zones.len(), 1);
        let block = &zones[0];
        // bar 3 body 1.3 of range 2.0 dominates
        assert_eq!(block.origin_index, 3);
        assert_eq!(block.low, 98.5);
        assert_eq!(block.high, 99.8);
        assert_eq!(block.role, Role::Primary);
        assert_eq!(block.status, ZoneStatus::Active);
        assert_eq!(block.strength, 1.0);
    }

    #[test]
    fn test_small_body_uses_full_range() {
        let mut bars = impulse_bars();
        // body 0.6 of range 2.0 (ratio 0.3): candidate but not dominant
        bars[3].open = 99.3;
        bars[3].close = 98.7;
        let config = AnalysisConfig::default();
        let mut structure = analyze_structure(&bars, &config);
        structure.meta.atr = Some(1.0);
        structure.events = vec![StructureEvent {
            kind: EventKind::ChangeOfCharacter,
            direction: Direction::Bullish,
            price: 101.5,
            timestamp: bars[4].timestamp,
            bar_index: 4,
            leg_index: 0,
            displacement: 1.5,
        }];
        structure.bias = crate::types::Bias::Bearish;
        let liquidity = analyze_liquidity(&bars, &structure, &MarketContext::default(), &config.liquidity);
        let tf = Timeframe::from("5m");
        let ctx = DetectionContext {
            bars: &bars,
            structure: &structure,
            liquidity: &liquidity,
            timeframe: &tf,
            config: &config.zones,
            prior: &[],
        };

        let zones = OrderBlockDetector.detect(&ctx).unwrap();
        assert_eq!(zones[0].low, 98.0);
        assert_eq!(zones[0].high, 100.0);
        assert_eq!(zones[0].role, Role::Countertrend);
    }

    #[test]
    fn test_no_atr_stands_down() {
        let bars = impulse_bars();
        let config = AnalysisConfig::default();
        let structure = analyze_structure(&bars, &config);
        let liquidity = analyze_liquidity(&bars, &structure, &MarketContext::default(), &config.liquidity);
        let tf = Timeframe::from("5m");
        let ctx = DetectionContext {
            bars: &bars,
            structure: &structure,
            liquidity: &liquidity,
            timeframe: &tf,
            config: &config.zones,
            prior: &[],
        };

        assert_eq!(
            OrderBlockDetector.detect(&ctx),
            Err(Degraded::AtrUnavailable {
                stage: "zones.order_block"
            })
        );
    }
}
