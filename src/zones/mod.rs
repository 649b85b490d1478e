//! Supply/demand zone detectors
//!
//! Detectors share one capability, [`ZoneDetector`], and run in the order
//! of [`DETECTORS`]. Later detectors see the zones produced so far (breakers
//! start from order blocks, POIs merge everything before them).

pub mod breaker;
pub mod imbalance;
pub mod order_block;
pub mod poi;

pub use breaker::BreakerDetector;
pub use imbalance::ImbalanceDetector;
pub use order_block::OrderBlockDetector;
pub use poi::PoiDetector;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::config::ZoneConfig;
use crate::error::Degraded;
use crate::liquidity::LiquidityState;
use crate::structure::{EventKind, StructureState};
use crate::types::{Bar, Direction, Role, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneKind {
    OrderBlock,
    Breaker,
    Imbalance,
    Poi,
}

impl ZoneKind {
    fn slug(self) -> &'static str {
        match self {
            ZoneKind::OrderBlock => "order_block",
            ZoneKind::Breaker => "breaker",
            ZoneKind::Imbalance => "imbalance",
            ZoneKind::Poi => "poi",
        }
    }
}

impl std::fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneKind::OrderBlock => write!(f, "ORDER_BLOCK"),
            ZoneKind::Breaker => write!(f, "BREAKER"),
            ZoneKind::Imbalance => write!(f, "IMBALANCE"),
            ZoneKind::Poi => write!(f, "POI"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneStatus {
    /// Not revisited since formation
    Active,
    /// Price traded back into the band
    Mitigated,
    /// Gap completely filled
    Filled,
    /// A close through the far side
    Invalidated,
    /// Older than the detector's maximum age
    Expired,
}

impl ZoneStatus {
    pub fn is_live(self) -> bool {
        matches!(self, ZoneStatus::Active | ZoneStatus::Mitigated)
    }
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneStatus::Active => write!(f, "ACTIVE"),
            ZoneStatus::Mitigated => write!(f, "MITIGATED"),
            ZoneStatus::Filled => write!(f, "FILLED"),
            ZoneStatus::Invalidated => write!(f, "INVALIDATED"),
            ZoneStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// What produced a zone
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Event {
        event: EventKind,
        direction: Direction,
        event_index: usize,
        leg_index: usize,
        event_time: DateTime<Utc>,
    },
    Gap {
        first_time: DateTime<Utc>,
        last_time: DateTime<Utc>,
    },
    Sweep {
        level: f64,
        side: Direction,
        time: DateTime<Utc>,
    },
    Zone {
        id: Uuid,
        kind: ZoneKind,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub id: Uuid,
    pub kind: ZoneKind,
    pub timeframe: Timeframe,
    pub low: f64,
    pub high: f64,
    pub origin_time: DateTime<Utc>,
    /// Index into the analyzed bar slice; not part of the identity
    pub origin_index: usize,
    pub direction: Direction,
    pub role: Role,
    /// 0..=1
    pub strength: f64,
    pub status: ZoneStatus,
    /// 0..=1, imbalances only
    pub fill_pct: f64,
    pub provenance: Vec<Provenance>,
}

impl Zone {
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// Price distance from the band (0 inside)
    pub fn distance(&self, price: f64) -> f64 {
        if price > self.high {
            price - self.high
        } else if price < self.low {
            self.low - price
        } else {
            0.0
        }
    }
}

/// Identity derived only from origin inputs, so re-detection over a longer
/// history yields the same id.
pub fn stable_id(kind: ZoneKind, timeframe: &Timeframe, origin: &str) -> Uuid {
    let name = format!("{}|{}|{}", kind.slug(), timeframe, origin);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Walk the bars after `from` and mark revisits and invalidation.
///
/// Bullish zones (demand) are invalidated by a close below `low`, bearish
/// zones (supply) by a close above `high`.
pub fn lifecycle(bars: &[Bar], from: usize, low: f64, high: f64, direction: Direction) -> ZoneStatus {
    let mut status = ZoneStatus::Active;

    for bar in bars.iter().skip(from + 1) {
        let (invalidated, touched) = match direction {
            Direction::Bullish => (bar.close < low, bar.low <= high),
            Direction::Bearish => (bar.close > high, bar.high >= low),
        };
        if invalidated {
            return ZoneStatus::Invalidated;
        }
        if touched {
            status = ZoneStatus::Mitigated;
        }
    }

    status
}

/// Everything a detector may look at
pub struct DetectionContext<'a> {
    pub bars: &'a [Bar],
    pub structure: &'a StructureState,
    pub liquidity: &'a LiquidityState,
    pub timeframe: &'a Timeframe,
    pub config: &'a ZoneConfig,
    /// Zones produced by the detectors that ran earlier
    pub prior: &'a [Zone],
}

impl DetectionContext<'_> {
    /// ATR or the degradation reason for `stage`
    pub fn require_atr(&self, stage: &'static str) -> Result<f64, Degraded> {
        self.structure
            .atr()
            .ok_or(Degraded::AtrUnavailable { stage })
    }
}

pub trait ZoneDetector: Send + Sync {
    fn kind(&self) -> ZoneKind;

    /// Zones found in the context, or why the detector stood down
    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<Zone>, Degraded>;
}

/// Detector run order
pub const DETECTORS: &[&dyn ZoneDetector] = &[
    &OrderBlockDetector,
    &ImbalanceDetector,
    &BreakerDetector,
    &PoiDetector,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneCounts {
    pub by_kind: BTreeMap<String, usize>,
    pub by_role: BTreeMap<String, usize>,
    pub active_by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneReport {
    pub all: Vec<Zone>,
    pub active: Vec<Zone>,
    pub counts: ZoneCounts,
    /// Detectors that stood down and why
    pub skipped: Vec<Degraded>,
}

impl ZoneReport {
    pub fn active_of(&self, kind: ZoneKind) -> impl Iterator<Item = &Zone> {
        self.active.iter().filter(move |z| z.kind == kind)
    }
}

/// Run stage 6: every detector in order, then the active filter
pub fn analyze_zones(
    bars: &[Bar],
    structure: &StructureState,
    liquidity: &LiquidityState,
    timeframe: &Timeframe,
    config: &ZoneConfig,
) -> ZoneReport {
    let mut all: Vec<Zone> = Vec::new();
    let mut skipped = Vec::new();

    for detector in DETECTORS {
        let ctx = DetectionContext {
            bars,
            structure,
            liquidity,
            timeframe,
            config,
            prior: &all,
        };
        match detector.detect(&ctx) {
            Ok(zones) => {
                debug!("{}: {} zones", detector.kind(), zones.len());
                all.extend(zones);
            }
            Err(reason) => {
                debug!("{}: skipped ({})", detector.kind(), reason);
                skipped.push(reason);
            }
        }
    }

    let last_close = bars.last().map(|b| b.close);
    let active: Vec<Zone> = all
        .iter()
        .filter(|zone| is_active(zone, bars.len(), last_close, structure.atr(), config))
        .cloned()
        .collect();

    let mut counts = ZoneCounts::default();
    for zone in &all {
        *counts.by_kind.entry(zone.kind.to_string()).or_default() += 1;
        *counts.by_role.entry(zone.role.to_string()).or_default() += 1;
    }
    for zone in &active {
        *counts.active_by_kind.entry(zone.kind.to_string()).or_default() += 1;
    }

    ZoneReport {
        all,
        active,
        counts,
        skipped,
    }
}

/// Lookback window for every zone, plus a distance-from-price filter in ATR
/// units for order blocks
fn is_active(
    zone: &Zone,
    bar_count: usize,
    last_close: Option<f64>,
    atr: Option<f64>,
    config: &ZoneConfig,
) -> bool {
    if !zone.status.is_live() {
        return false;
    }
    if zone.origin_index + config.lookback_bars < bar_count {
        return false;
    }
    if zone.kind == ZoneKind::OrderBlock {
        return match (last_close, atr) {
            (Some(close), Some(atr)) => {
                zone.distance(close) <= config.order_block.max_distance_atr * atr
            }
            _ => false,
        };
    }
    true
}
