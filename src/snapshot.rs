//! Snapshot orchestration
//!
//! One [`SnapshotInput`] (a symbol's bar series per timeframe plus optional
//! higher-timeframe hints) runs through sanitation and stages 1-7 in
//! [`analyze`], which is pure. [`Analysis::stabilize`] then feeds the raw
//! decision through the symbol's stabilization record and produces the
//! boundary [`Snapshot`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{BarError, Degraded};
use crate::liquidity::{analyze_liquidity, LiquidityState};
use crate::scenario::{classify, ClassifierInputs, ScenarioDecision, ScenarioReport, ScenarioStore};
use crate::structure::{analyze_structure, EventKind, StructureState};
use crate::types::{Bar, DailyRange, Direction, MarketContext, Timeframe};
use crate::zones::{analyze_zones, ZoneReport};

/// Everything the core consumes for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInput {
    pub symbol: String,
    pub primary_timeframe: Timeframe,
    /// Closed bars only, per timeframe
    pub series: BTreeMap<Timeframe, Vec<Bar>>,
    #[serde(default)]
    pub context: MarketContext,
}

impl SnapshotInput {
    pub fn new(symbol: impl Into<String>, primary_timeframe: impl Into<Timeframe>, bars: Vec<Bar>) -> Self {
        let primary_timeframe = primary_timeframe.into();
        let mut series = BTreeMap::new();
        series.insert(primary_timeframe.clone(), bars);
        Self {
            symbol: symbol.into(),
            primary_timeframe,
            series,
            context: MarketContext::default(),
        }
    }

    pub fn primary_bars(&self) -> Option<&[Bar]> {
        self.series.get(&self.primary_timeframe).map(Vec::as_slice)
    }

    /// Lowest supplied timeframe strictly below the primary one
    pub fn micro_timeframe(&self) -> Option<&Timeframe> {
        let primary = self.primary_timeframe.minutes()?;
        self.series
            .keys()
            .filter_map(|tf| tf.minutes().map(|m| (m, tf)))
            .filter(|(m, _)| *m < primary)
            .min_by_key(|(m, _)| *m)
            .map(|(_, tf)| tf)
    }

    /// The input as it stood when the primary bar at `as_of` closed: every
    /// series keeps only the bars that had closed by then
    pub fn until(&self, as_of: DateTime<Utc>) -> SnapshotInput {
        let closed_at = as_of + bar_length(&self.primary_timeframe);
        let series = self
            .series
            .iter()
            .map(|(tf, bars)| {
                let length = bar_length(tf);
                let kept = bars
                    .iter()
                    .filter(|b| b.timestamp + length <= closed_at)
                    .cloned()
                    .collect();
                (tf.clone(), kept)
            })
            .collect();

        SnapshotInput {
            symbol: self.symbol.clone(),
            primary_timeframe: self.primary_timeframe.clone(),
            series,
            context: self.context.clone(),
        }
    }
}

fn bar_length(timeframe: &Timeframe) -> Duration {
    timeframe
        .minutes()
        .map(|m| Duration::minutes(m as i64))
        .unwrap_or_else(Duration::zero)
}

/// Lower-timeframe break that can shorten scenario confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicroSignal {
    pub timeframe: Timeframe,
    pub kind: EventKind,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMeta {
    pub symbol: String,
    pub primary_timeframe: Timeframe,
    pub last_price: Option<f64>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub bar_count: usize,
    pub rejected_bars: Vec<BarError>,
    /// True when the daily range came from the `1d` series, not the context
    pub daily_range_derived: bool,
    pub micro: Option<MicroSignal>,
    pub degraded: Vec<Degraded>,
}

/// Output of stages 1-7, before stabilization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub structure: StructureState,
    pub liquidity: LiquidityState,
    pub zones: ZoneReport,
    pub decision: ScenarioDecision,
    pub meta: SnapshotMeta,
}

/// The structured per-symbol output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub structure: StructureState,
    pub liquidity: LiquidityState,
    pub zones: ZoneReport,
    /// Absent only when the primary series has no usable bars
    pub scenario: Option<ScenarioReport>,
    pub meta: SnapshotMeta,
}

impl Analysis {
    /// Time of the last primary bar; the stabilizer's clock
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.meta.window_end
    }

    pub fn stabilize(self, store: &mut ScenarioStore) -> Snapshot {
        let micro = self.meta.micro.as_ref().map(|m| m.direction);
        let scenario = self
            .as_of()
            .map(|as_of| store.observe(&self.meta.symbol, self.decision, as_of, micro));

        Snapshot {
            structure: self.structure,
            liquidity: self.liquidity,
            zones: self.zones,
            scenario,
            meta: self.meta,
        }
    }
}

/// Drop malformed or out-of-order bars, keeping the rest in order
pub fn sanitize_bars(bars: &[Bar]) -> (Vec<Bar>, Vec<BarError>) {
    let mut clean: Vec<Bar> = Vec::with_capacity(bars.len());
    let mut rejected = Vec::new();

    for (index, bar) in bars.iter().enumerate() {
        match check_bar(index, bar, clean.last()) {
            Ok(()) => clean.push(bar.clone()),
            Err(err) => rejected.push(err),
        }
    }

    (clean, rejected)
}

fn check_bar(index: usize, bar: &Bar, previous: Option<&Bar>) -> Result<(), BarError> {
    let timestamp = bar.timestamp;
    let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(BarError::NonFinite { index, timestamp });
    }
    if bar.high < bar.low || bar.high < bar.open.max(bar.close) || bar.low > bar.open.min(bar.close) {
        return Err(BarError::InconsistentOhlc {
            index,
            timestamp,
            high: bar.high,
            low: bar.low,
        });
    }
    if bar.volume < 0.0 {
        return Err(BarError::NegativeVolume { index, timestamp });
    }
    if let Some(prev) = previous {
        if timestamp <= prev.timestamp {
            return Err(BarError::OutOfOrder {
                index,
                timestamp,
                previous: prev.timestamp,
            });
        }
    }
    Ok(())
}

/// Sanitize and keep the trailing `max_lookback` bars
fn prepare_series(bars: &[Bar], max_lookback: usize) -> (Vec<Bar>, Vec<BarError>) {
    let (mut clean, rejected) = sanitize_bars(bars);
    if clean.len() > max_lookback {
        clean.drain(..clean.len() - max_lookback);
    }
    (clean, rejected)
}

/// Context with the daily range filled from the last daily bar that had
/// closed by `closed_at`, when the caller did not supply one
fn resolve_context(input: &SnapshotInput, closed_at: Option<DateTime<Utc>>) -> (MarketContext, bool) {
    let mut context = input.context.clone();
    if context.daily_range.is_some() {
        return (context, false);
    }

    let daily = input
        .series
        .iter()
        .find(|(tf, _)| tf.is_daily() && **tf != input.primary_timeframe);
    let Some((timeframe, daily)) = daily else {
        return (context, false);
    };

    let length = bar_length(timeframe);
    let (clean, _) = sanitize_bars(daily);
    let previous = clean
        .iter()
        .rev()
        .find(|bar| closed_at.map_or(true, |t| bar.timestamp + length <= t));

    match previous {
        Some(bar) => {
            context.daily_range = Some(DailyRange {
                high: bar.high,
                low: bar.low,
            });
            (context, true)
        }
        None => (context, false),
    }
}

/// Most recent break on the micro timeframe within its last
/// `micro_recent_bars` bars
fn micro_signal(input: &SnapshotInput, config: &AnalysisConfig) -> Option<MicroSignal> {
    let timeframe = input.micro_timeframe()?;
    let bars = input.series.get(timeframe)?;
    let (bars, _) = prepare_series(bars, config.structure.max_lookback_bars);
    let structure = analyze_structure(&bars, config);

    let event = structure.events.last()?;
    let age = bars.len().saturating_sub(1 + event.bar_index);
    (age < config.scenario.micro_recent_bars).then(|| MicroSignal {
        timeframe: timeframe.clone(),
        kind: event.kind,
        direction: event.direction,
        timestamp: event.timestamp,
    })
}

/// Run sanitation and stages 1-7 for one symbol
pub fn analyze(input: &SnapshotInput, config: &AnalysisConfig) -> Analysis {
    let mut degraded = Vec::new();

    let raw: &[Bar] = match input.primary_bars() {
        Some(bars) => bars,
        None => {
            warn!(
                "{}: primary timeframe {} missing from input",
                input.symbol, input.primary_timeframe
            );
            degraded.push(Degraded::MissingPrimarySeries {
                timeframe: input.primary_timeframe.to_string(),
            });
            &[]
        }
    };

    let (bars, rejected) = prepare_series(raw, config.structure.max_lookback_bars);
    for err in &rejected {
        warn!("{}: rejected {}", input.symbol, err);
    }

    let as_of = bars.last().map(|b| b.timestamp);
    let primary_closed_at = as_of.map(|t| t + bar_length(&input.primary_timeframe));
    let (context, daily_range_derived) = resolve_context(input, primary_closed_at);

    let structure = analyze_structure(&bars, config);
    let liquidity = analyze_liquidity(&bars, &structure, &context, &config.liquidity);
    let zones = analyze_zones(&bars, &structure, &liquidity, &input.primary_timeframe, &config.zones);
    let decision = classify(
        &ClassifierInputs {
            bars: &bars,
            structure: &structure,
            liquidity: &liquidity,
            zones: &zones,
            context: &context,
        },
        &config.scenario,
    );
    let micro = micro_signal(input, config);

    debug!(
        "{} {}: {} bars, {} pools, {} zones ({} active), raw {} ({:.2})",
        input.symbol,
        input.primary_timeframe,
        bars.len(),
        liquidity.pools.len(),
        zones.all.len(),
        zones.active.len(),
        decision.label,
        decision.confidence
    );

    let meta = SnapshotMeta {
        symbol: input.symbol.clone(),
        primary_timeframe: input.primary_timeframe.clone(),
        last_price: bars.last().map(|b| b.close),
        window_start: bars.first().map(|b| b.timestamp),
        window_end: as_of,
        bar_count: bars.len(),
        rejected_bars: rejected,
        daily_range_derived,
        micro,
        degraded,
    };

    Analysis {
        structure,
        liquidity,
        zones,
        decision,
        meta,
    }
}

/// Analyze and stabilize in one call
pub fn snapshot(input: &SnapshotInput, config: &AnalysisConfig, store: &mut ScenarioStore) -> Snapshot {
    analyze(input, config).stabilize(store)
}
