//! Optimal-trade-entry retracement bands

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::legs::StructureLeg;
use crate::config::OteConfig;
use crate::types::{Bias, Direction, Role};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OteZone {
    pub low: f64,
    pub high: f64,
    pub direction: Direction,
    pub role: Role,
    pub leg_index: usize,
    pub leg_start: DateTime<Utc>,
    pub leg_end: DateTime<Utc>,
    pub amplitude: f64,
}

impl OteZone {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Retracement band `[fib_lower, fib_upper]` of a leg, measured back from its end
fn band(leg: &StructureLeg, config: &OteConfig) -> (f64, f64) {
    let amplitude = leg.amplitude();
    match leg.direction {
        Direction::Bullish => (
            leg.end.price - config.fib_upper * amplitude,
            leg.end.price - config.fib_lower * amplitude,
        ),
        Direction::Bearish => (
            leg.end.price + config.fib_lower * amplitude,
            leg.end.price + config.fib_upper * amplitude,
        ),
    }
}

/// OTE zones for legs from `first_leg` onwards whose amplitude exceeds
/// `leg_min_amplitude_atr * atr`. Primary zones are capped per direction,
/// oldest dropped first; other zones are all kept.
pub fn compute_ote_zones(
    legs: &[StructureLeg],
    first_leg: usize,
    atr: f64,
    bias: Bias,
    config: &OteConfig,
) -> Vec<OteZone> {
    let min_amplitude = config.leg_min_amplitude_atr * atr;

    let mut zones: Vec<OteZone> = legs
        .iter()
        .enumerate()
        .skip(first_leg)
        .filter(|(_, leg)| leg.amplitude() > min_amplitude)
        .map(|(leg_index, leg)| {
            let (low, high) = band(leg, config);
            let role = Role::relative(leg.direction, bias);
            OteZone {
                low,
                high,
                direction: leg.direction,
                role,
                leg_index,
                leg_start: leg.start.timestamp,
                leg_end: leg.end.timestamp,
                amplitude: leg.amplitude(),
            }
        })
        .collect();

    let mut kept_bullish = 0usize;
    let mut kept_bearish = 0usize;
    let mut keep = vec![true; zones.len()];
    for (i, zone) in zones.iter().enumerate().rev() {
        if zone.role != Role::Primary {
            continue;
        }
        let kept = match zone.direction {
            Direction::Bullish => &mut kept_bullish,
            Direction::Bearish => &mut kept_bearish,
        };
        if *kept >= config.max_zones_per_side {
            keep[i] = false;
        } else {
            *kept += 1;
        }
    }

    let mut flags = keep.into_iter();
    zones.retain(|_| flags.next().unwrap_or(false));
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::swings::{Swing, SwingKind};
    use crate::test_support::ts;

    fn leg(start: f64, end: f64, index: usize) -> StructureLeg {
        let (start_kind, end_kind, direction) = if end > start {
            (SwingKind::Low, SwingKind::High, Direction::Bullish)
        } else {
            (SwingKind::High, SwingKind::Low, Direction::Bearish)
        };
        let swing = |price, kind, i: usize| Swing {
            index: i,
            timestamp: ts(i as i64),
            price,
            kind,
            strength: 1,
        };
        StructureLeg {
            start: swing(start, start_kind, index),
            end: swing(end, end_kind, index + 1),
            direction,
            label: None,
        }
    }

    #[test]
    fn test_bullish_band() {
        let legs = vec![leg(100.0, 110.0, 0)];
        let zones = compute_ote_zones(&legs, 0, 1.0, Bias::Bullish, &OteConfig::default());

        assert_eq!(zones.len(), 1);
        assert!((zones[0].low - 102.1).abs() < 1e-9);
        assert!((zones[0].high - 103.8).abs() < 1e-9);
        assert_eq!(zones[0].role, Role::Primary);
    }

    #[test]
    fn test_bearish_band_countertrend() {
        let legs = vec![leg(110.0, 100.0, 0)];
        let zones = compute_ote_zones(&legs, 0, 1.0, Bias::Bullish, &OteConfig::default());

        assert_eq!(zones[0].direction, Direction::Bearish);
        assert_eq!(zones[0].role, Role::Countertrend);
        assert!((zones[0].low - 106.2).abs() < 1e-9);
        assert!((zones[0].high - 107.9).abs() < 1e-9);
    }

    #[test]
    fn test_small_legs_skipped() {
        let legs = vec![leg(100.0, 101.0, 0)];
        assert!(compute_ote_zones(&legs, 0, 1.0, Bias::Bullish, &OteConfig::default()).is_empty());
    }

    #[test]
    fn test_primary_cap_drops_oldest() {
        let legs = vec![
            leg(100.0, 110.0, 0),
            leg(110.0, 105.0, 2),
            leg(105.0, 115.0, 4),
            leg(115.0, 109.0, 6),
            leg(109.0, 120.0, 8),
        ];
        let zones = compute_ote_zones(&legs, 0, 1.0, Bias::Bullish, &OteConfig::default());

        let primary: Vec<_> = zones.iter().filter(|z| z.role == Role::Primary).collect();
        assert_eq!(primary.len(), 2);
        assert_eq!(primary[0].leg_index, 2);
        assert_eq!(primary[1].leg_index, 4);
        assert_eq!(zones.len(), 4);
    }

    #[test]
    fn test_first_leg_offset() {
        let legs = vec![leg(100.0, 110.0, 0), leg(110.0, 100.0, 2)];
        let zones = compute_ote_zones(&legs, 1, 1.0, Bias::Bearish, &OteConfig::default());
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].leg_index, 1);
    }
}
