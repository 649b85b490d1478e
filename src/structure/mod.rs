//! Structure pipeline
//!
//! Swings → legs → trend/bias → break events → active range → OTE bands.
//! [`analyze_structure`] is a pure function of the bar slice and config.

pub mod atr;
pub mod legs;
pub mod ote;
pub mod range;
pub mod swings;

pub use atr::average_true_range;
pub use legs::{EventKind, StructureEvent, StructureLeg, SwingLabel};
pub use ote::OteZone;
pub use range::{RangeState, TradingRange};
pub use swings::{Swing, SwingKind};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::Degraded;
use crate::types::{Bar, Bias, Trend};

/// Which path produced the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendSource {
    /// Recent swing labels
    Swings,
    /// Close-to-close drift efficiency (too few labels)
    Drift,
    /// Neither path was conclusive
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureMeta {
    pub bar_count: usize,
    pub atr_period: usize,
    pub atr: Option<f64>,
    /// ATR part of the break threshold (`break_atr_multiple * atr`)
    pub break_threshold_atr: Option<f64>,
    /// ATR as a fraction of the last close
    pub volatility_pct: Option<f64>,
    pub trend_source: TrendSource,
    pub drift_efficiency: Option<f64>,
    pub last_choch: Option<DateTime<Utc>>,
    pub degraded: Vec<Degraded>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureState {
    pub trend: Trend,
    pub bias: Bias,
    pub swings: Vec<Swing>,
    pub legs: Vec<StructureLeg>,
    pub active_range: Option<TradingRange>,
    pub events: Vec<StructureEvent>,
    pub ote_zones: Vec<OteZone>,
    pub meta: StructureMeta,
}

impl StructureState {
    pub fn atr(&self) -> Option<f64> {
        self.meta.atr
    }

    pub fn last_choch(&self) -> Option<&StructureEvent> {
        self.events.iter().rev().find(|e| e.is_choch())
    }

    /// Most recent swing of `kind`
    pub fn last_swing(&self, kind: SwingKind) -> Option<&Swing> {
        self.swings.iter().rev().find(|s| s.kind == kind)
    }
}

/// Run stages 1-4 over an already-sanitized, time-ordered bar slice
pub fn analyze_structure(bars: &[Bar], config: &AnalysisConfig) -> StructureState {
    let mut degraded = Vec::new();
    let window = config.swing.window;

    let swings = swings::detect_swings(bars, window, config.swing.strength_cap);
    if bars.len() < 2 * window + 1 {
        degraded.push(Degraded::InsufficientBars {
            stage: "swings",
            needed: 2 * window + 1,
            have: bars.len(),
        });
    }

    let legs = legs::build_legs(&swings);
    let labels = legs::leg_labels(&legs);

    let drift = atr::close_drift(bars);
    let (trend, trend_source) = match legs::infer_trend(&labels, config.structure.trend_labels) {
        Some(trend) => (trend, TrendSource::Swings),
        None => match drift {
            Some((net, efficiency)) if efficiency >= config.structure.drift_efficiency => {
                let trend = if net > 0.0 { Trend::Up } else { Trend::Down };
                (trend, TrendSource::Drift)
            }
            _ => (Trend::Unknown, TrendSource::Inconclusive),
        },
    };

    let atr = average_true_range(bars, config.structure.atr_period);

    let events = match atr {
        Some(atr) => legs::detect_events(bars, &legs, atr, &config.structure),
        None => {
            degraded.push(Degraded::AtrUnavailable {
                stage: "structure.events",
            });
            Vec::new()
        }
    };

    let last_choch = events.iter().rev().find(|e| e.is_choch());
    let bias = match last_choch {
        Some(event) => Bias::from(event.direction),
        None => Bias::from_trend(trend),
    };

    let active_range = match range::detect_range(bars, &config.range) {
        Ok(range) => Some(range),
        Err(reason) => {
            degraded.push(reason);
            None
        }
    };

    let ote_zones = match atr {
        Some(atr) => {
            let first_leg = last_choch.map(|e| e.leg_index).unwrap_or(0);
            ote::compute_ote_zones(&legs, first_leg, atr, bias, &config.ote)
        }
        None => {
            degraded.push(Degraded::AtrUnavailable { stage: "structure.ote" });
            Vec::new()
        }
    };

    let last_close = bars.last().map(|b| b.close);
    let meta = StructureMeta {
        bar_count: bars.len(),
        atr_period: config.structure.atr_period,
        atr,
        break_threshold_atr: atr.map(|a| a * config.structure.break_atr_multiple),
        volatility_pct: atr.zip(last_close).and_then(|(a, c)| (c > 0.0).then(|| a / c)),
        trend_source,
        drift_efficiency: drift.map(|(_, efficiency)| efficiency),
        last_choch: last_choch.map(|e| e.timestamp),
        degraded,
    };

    debug!(
        "structure: {} bars, {} swings, {} legs, trend {}, bias {}, {} events, {} OTE",
        bars.len(),
        swings.len(),
        legs.len(),
        trend,
        bias,
        events.len(),
        ote_zones.len()
    );

    StructureState {
        trend,
        bias,
        swings,
        legs,
        active_range,
        events,
        ote_zones,
        meta,
    }
}
