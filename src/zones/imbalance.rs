//! Three-candle imbalances (fair value gaps)

use super::{stable_id, DetectionContext, Provenance, Zone, ZoneDetector, ZoneKind, ZoneStatus};
use crate::error::Degraded;
use crate::types::{Bar, Direction, Role};

pub struct ImbalanceDetector;

impl ZoneDetector for ImbalanceDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::Imbalance
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<Zone>, Degraded> {
        let atr = ctx.require_atr("zones.imbalance")?;
        let config = &ctx.config.imbalance;
        let bars = ctx.bars;
        let mut zones = Vec::new();

        for i in 2..bars.len() {
            let (first, middle, last) = (&bars[i - 2], &bars[i - 1], &bars[i]);

            let (low, high, direction) = if last.low > first.high {
                (first.high, last.low, Direction::Bullish)
            } else if last.high < first.low {
                (last.high, first.low, Direction::Bearish)
            } else {
                continue;
            };

            let size = high - low;
            let min_size = (config.min_gap_atr * atr).max(config.min_gap_pct * middle.close);
            if size <= min_size {
                continue;
            }

            let fill_pct = fill_fraction(&bars[i + 1..], low, high, direction);
            let age = bars.len() - 1 - (i - 1);
            let status = if fill_pct >= 1.0 {
                ZoneStatus::Filled
            } else if age > config.max_age_bars {
                ZoneStatus::Expired
            } else if fill_pct > 0.0 {
                ZoneStatus::Mitigated
            } else {
                ZoneStatus::Active
            };

            zones.push(Zone {
                id: stable_id(
                    ZoneKind::Imbalance,
                    ctx.timeframe,
                    &format!("{}|{}", middle.timestamp.to_rfc3339(), direction),
                ),
                kind: ZoneKind::Imbalance,
                timeframe: ctx.timeframe.clone(),
                low,
                high,
                origin_time: middle.timestamp,
                origin_index: i - 1,
                direction,
                role: Role::relative(direction, ctx.structure.bias),
                strength: (size / (2.0 * atr)).min(1.0) * (1.0 - fill_pct),
                status,
                fill_pct,
                provenance: vec![Provenance::Gap {
                    first_time: first.timestamp,
                    last_time: last.timestamp,
                }],
            });
        }

        Ok(zones)
    }
}

/// Fraction of the gap revisited by later bars. Bullish gaps fill from the
/// top down, bearish gaps from the bottom up.
fn fill_fraction(later: &[Bar], low: f64, high: f64, direction: Direction) -> f64 {
    let size = high - low;
    if size <= 0.0 {
        return 0.0;
    }

    let penetration = match direction {
        Direction::Bullish => later
            .iter()
            .map(|b| high - b.low)
            .fold(0.0, f64::max),
        Direction::Bearish => later
            .iter()
            .map(|b| b.high - low)
            .fold(0.0, f64::max),
    };

    (penetration / size).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::liquidity::analyze_liquidity;
    use crate::structure::analyze_structure;
    use crate::test_support::ohlc_bars;
    use crate::types::{MarketContext, Timeframe};

    fn detect(bars: &[Bar], atr: f64, max_age: usize) -> Vec<Zone> {
        let mut config = AnalysisConfig::default();
        config.zones.imbalance.max_age_bars = max_age;
        let mut structure = analyze_structure(bars, &config);
        structure.meta.atr = Some(atr);
        let liquidity = analyze_liquidity(bars, &structure, &MarketContext::default(), &config.liquidity);
        let tf = Timeframe::from("1m");
        let ctx = DetectionContext {
            bars,
            structure: &structure,
            liquidity: &liquidity,
            timeframe: &tf,
            config: &config.zones,
            prior: &[],
        };
        ImbalanceDetector.detect(&ctx).unwrap()
    }

    #[test]
    fn test_bullish_gap_partially_filled() {
        let bars = ohlc_bars(&[
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 105.0, 100.7, 104.8),
            (104.8, 106.0, 103.0, 105.5),
            (105.5, 105.8, 102.5, 103.5),
        ]);
        let zones = detect(&bars, 1.0, 100);

        assert_eq!(zones.len(), 1);
        let gap = &zones[0];
        assert_eq!(gap.direction, Direction::Bullish);
        assert_eq!(gap.low, 101.0);
        assert_eq!(gap.high, 103.0);
        assert!((gap.fill_pct - 0.25).abs() < 1e-9);
        assert_eq!(gap.status, ZoneStatus::Mitigated);
        assert_eq!(gap.origin_index, 1);
    }

    #[test]
    fn test_gap_filled_and_expired() {
        let mut rows = vec![
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 105.0, 100.7, 104.8),
            (104.8, 106.0, 103.0, 105.5),
        ];
        let open = rows.clone();
        rows.push((105.5, 105.8, 100.5, 101.0));
        let filled = detect(&ohlc_bars(&rows), 1.0, 100);
        assert_eq!(filled[0].status, ZoneStatus::Filled);
        assert_eq!(filled[0].fill_pct, 1.0);

        let mut aged = open;
        for _ in 0..5 {
            aged.push((106.0, 107.0, 105.5, 106.5));
        }
        let expired = detect(&ohlc_bars(&aged), 1.0, 3);
        assert_eq!(expired[0].status, ZoneStatus::Expired);
    }

    #[test]
    fn test_gap_below_threshold_ignored() {
        let bars = ohlc_bars(&[
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 105.0, 100.7, 104.8),
            (104.8, 106.0, 103.0, 105.5),
        ]);
        // 2.0 gap against a 0.25 * 10 = 2.5 threshold
        assert!(detect(&bars, 10.0, 100).is_empty());
    }
}
