//! Raw scenario classifier
//!
//! Each named scenario is an ordered list of gates. The first scenario whose
//! gates all pass wins. Otherwise the result is `Unclear`, carrying the first
//! failed gate of the scenario that got furthest. Stateless and deterministic.

use serde::Serialize;

use crate::config::ScenarioConfig;
use crate::liquidity::{LiquidityState, Phase};
use crate::structure::{EventKind, StructureState, SwingKind};
use crate::types::{Bar, Direction, MarketContext, Role};
use crate::zones::{ZoneReport, ZoneStatus};

/// `Unclear` confidence is gate progress scaled by this, so it stays below
/// the lowest base confidence of a named scenario
const UNCLEAR_CONFIDENCE_SCALE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioLabel {
    /// Higher-timeframe extreme swept and price reclaimed back inside
    SweepReversal,
    /// Aligned trend holding its reference level with a primary zone to work from
    TrendContinuation,
    Unclear,
}

impl std::fmt::Display for ScenarioLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioLabel::SweepReversal => write!(f, "SWEEP_REVERSAL"),
            ScenarioLabel::TrendContinuation => write!(f, "TREND_CONTINUATION"),
            ScenarioLabel::Unclear => write!(f, "UNCLEAR"),
        }
    }
}

/// First failed gate behind an `Unclear` decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnclearReason {
    NoBars,
    NoHtfRange,
    NoHtfSweep,
    NotBackInside,
    NoReversalConfirmation,
    NoBias,
    TrendNotAligned,
    ReferenceLost,
    NoPrimaryZone,
}

impl std::fmt::Display for UnclearReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            UnclearReason::NoBars => "no bars",
            UnclearReason::NoHtfRange => "no higher-timeframe range",
            UnclearReason::NoHtfSweep => "no recent sweep of a higher-timeframe extreme",
            UnclearReason::NotBackInside => "price did not close back inside the higher-timeframe range",
            UnclearReason::NoReversalConfirmation => "no change of character or manipulation confirming the reversal",
            UnclearReason::NoBias => "no directional bias",
            UnclearReason::TrendNotAligned => "trend not aligned with bias",
            UnclearReason::ReferenceLost => "price lost the reference level",
            UnclearReason::NoPrimaryZone => "no primary zone or OTE in the bias direction",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyLevel {
    pub name: String,
    pub price: f64,
}

impl KeyLevel {
    fn new(name: &str, price: f64) -> Self {
        Self {
            name: name.to_string(),
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioDecision {
    pub label: ScenarioLabel,
    pub direction: Option<Direction>,
    /// 0..=1
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub key_levels: Vec<KeyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unclear_reason: Option<UnclearReason>,
}

impl ScenarioDecision {
    /// Identity used for hysteresis
    pub fn key(&self) -> (ScenarioLabel, Option<Direction>) {
        (self.label, self.direction)
    }

    pub fn unclear(reason: UnclearReason, confidence: f64, reasons: Vec<String>) -> Self {
        Self {
            label: ScenarioLabel::Unclear,
            direction: None,
            confidence,
            reasons,
            key_levels: Vec::new(),
            unclear_reason: Some(reason),
        }
    }
}

pub struct ClassifierInputs<'a> {
    pub bars: &'a [Bar],
    pub structure: &'a StructureState,
    pub liquidity: &'a LiquidityState,
    pub zones: &'a ZoneReport,
    /// Context with the daily range already resolved
    pub context: &'a MarketContext,
}

/// Outcome of walking one scenario's gates
struct GateWalk {
    total: usize,
    passed: usize,
    failed: Option<UnclearReason>,
    reasons: Vec<String>,
    direction: Option<Direction>,
    confidence: f64,
    key_levels: Vec<KeyLevel>,
}

impl GateWalk {
    fn new(total: usize) -> Self {
        Self {
            total,
            passed: 0,
            failed: None,
            reasons: Vec::new(),
            direction: None,
            confidence: 0.0,
            key_levels: Vec::new(),
        }
    }

    fn pass(&mut self, reason: String) {
        self.passed += 1;
        self.reasons.push(reason);
    }

    fn fail(mut self, reason: UnclearReason) -> Self {
        self.reasons.push(format!("failed: {reason}"));
        self.failed = Some(reason);
        self
    }
}

pub fn classify(inputs: &ClassifierInputs<'_>, config: &ScenarioConfig) -> ScenarioDecision {
    if inputs.bars.is_empty() {
        return ScenarioDecision::unclear(UnclearReason::NoBars, 0.0, vec![UnclearReason::NoBars.to_string()]);
    }

    let walks = [
        (ScenarioLabel::SweepReversal, sweep_reversal(inputs, config)),
        (ScenarioLabel::TrendContinuation, trend_continuation(inputs)),
    ];

    for (label, walk) in &walks {
        if walk.failed.is_none() {
            return ScenarioDecision {
                label: *label,
                direction: walk.direction,
                confidence: walk.confidence.clamp(0.0, 1.0),
                reasons: walk.reasons.clone(),
                key_levels: walk.key_levels.clone(),
                unclear_reason: None,
            };
        }
    }

    // Furthest progress wins; ties keep the earlier scenario
    let (label, walk) = walks
        .iter()
        .fold(None::<&(ScenarioLabel, GateWalk)>, |best, cur| match best {
            Some(b) if b.1.passed >= cur.1.passed => Some(b),
            _ => Some(cur),
        })
        .map(|(label, walk)| (*label, walk))
        .unwrap_or((ScenarioLabel::Unclear, &walks[0].1));

    let reason = walk.failed.unwrap_or(UnclearReason::NoBias);
    let mut reasons = vec![format!("{label}: {reason}")];
    reasons.extend(walk.reasons.iter().cloned());

    let progress = walk.passed as f64 / walk.total as f64;
    let mut decision = ScenarioDecision::unclear(reason, progress * UNCLEAR_CONFIDENCE_SCALE, reasons);
    decision.key_levels = walk.key_levels.clone();
    decision
}

fn sweep_reversal(inputs: &ClassifierInputs<'_>, config: &ScenarioConfig) -> GateWalk {
    let mut walk = GateWalk::new(4);
    let bars = inputs.bars;

    let Some(range) = inputs.context.daily_range else {
        return walk.fail(UnclearReason::NoHtfRange);
    };
    walk.key_levels.push(KeyLevel::new("htf_high", range.high));
    walk.key_levels.push(KeyLevel::new("htf_low", range.low));
    walk.pass(format!("higher-timeframe range {:.2}-{:.2}", range.low, range.high));

    let recent_from = bars.len().saturating_sub(config.sweep_recent_bars.max(1));
    let sweep = (recent_from..bars.len()).rev().find_map(|i| {
        let bar = &bars[i];
        if bar.high > range.high {
            Some((i, Direction::Bearish, bar.high))
        } else if bar.low < range.low {
            Some((i, Direction::Bullish, bar.low))
        } else {
            None
        }
    });
    let Some((sweep_index, reversal, extreme)) = sweep else {
        return walk.fail(UnclearReason::NoHtfSweep);
    };
    walk.key_levels.push(KeyLevel::new("swept_extreme", extreme));
    walk.pass(format!(
        "swept higher-timeframe {} at {:.2}",
        if reversal == Direction::Bearish { "high" } else { "low" },
        extreme
    ));

    let last_close = bars[bars.len() - 1].close;
    if !range.contains(last_close) {
        return walk.fail(UnclearReason::NotBackInside);
    }
    walk.pass(format!("closed back inside at {last_close:.2}"));

    let choch = inputs
        .structure
        .events
        .iter()
        .rev()
        .find(|e| e.kind == EventKind::ChangeOfCharacter && e.direction == reversal && e.bar_index >= sweep_index);
    let manipulation = inputs.liquidity.phase == Phase::Manipulation;
    if choch.is_none() && !manipulation {
        return walk.fail(UnclearReason::NoReversalConfirmation);
    }

    let mut confidence: f64 = 0.55;
    if let Some(event) = choch {
        walk.key_levels.push(KeyLevel::new("choch_level", event.price));
        walk.pass(format!("{} change of character at {:.2}", event.direction, event.price));
        confidence += 0.15;
    }
    if manipulation {
        if choch.is_none() {
            walk.pass("manipulation phase".to_string());
        } else {
            walk.reasons.push("manipulation phase".to_string());
        }
        confidence += 0.1;
    }
    if inputs.context.htf_bias.and_then(|b| b.direction()) == Some(reversal) {
        walk.reasons.push("higher-timeframe bias agrees".to_string());
        confidence += 0.1;
    }

    walk.direction = Some(reversal);
    walk.confidence = confidence.min(0.95);
    walk
}

fn trend_continuation(inputs: &ClassifierInputs<'_>) -> GateWalk {
    let mut walk = GateWalk::new(4);
    let structure = inputs.structure;

    let Some(bias) = structure.bias.direction() else {
        return walk.fail(UnclearReason::NoBias);
    };
    walk.pass(format!("bias {bias}"));

    let htf_conflict = inputs
        .context
        .htf_bias
        .and_then(|b| b.direction())
        .is_some_and(|htf| htf != bias);
    if structure.trend.direction() != Some(bias) || htf_conflict {
        return walk.fail(UnclearReason::TrendNotAligned);
    }
    walk.pass(format!("trend {} aligned", structure.trend));

    // Last swing against the bias, else the opposite extreme of the range
    let reference = match bias {
        Direction::Bullish => structure
            .last_swing(SwingKind::Low)
            .map(|s| s.price)
            .or_else(|| structure.active_range.as_ref().map(|r| r.low)),
        Direction::Bearish => structure
            .last_swing(SwingKind::High)
            .map(|s| s.price)
            .or_else(|| structure.active_range.as_ref().map(|r| r.high)),
    };
    let last_close = inputs.bars[inputs.bars.len() - 1].close;
    let holds = reference.is_some_and(|level| match bias {
        Direction::Bullish => last_close > level,
        Direction::Bearish => last_close < level,
    });
    let Some(reference) = reference.filter(|_| holds) else {
        return walk.fail(UnclearReason::ReferenceLost);
    };
    walk.key_levels.push(KeyLevel::new("reference", reference));
    walk.pass(format!("holding reference {reference:.2}"));

    let zone = inputs
        .zones
        .active
        .iter()
        .filter(|z| z.direction == bias && z.role == Role::Primary && z.status != ZoneStatus::Invalidated)
        .max_by(|a, b| a.origin_index.cmp(&b.origin_index))
        .map(|z| (z.kind.to_string(), z.low, z.high));
    let ote = structure
        .ote_zones
        .iter()
        .rev()
        .find(|z| z.direction == bias && z.role == Role::Primary)
        .map(|z| ("OTE".to_string(), z.low, z.high));
    let Some((name, low, high)) = zone.or(ote) else {
        return walk.fail(UnclearReason::NoPrimaryZone);
    };
    walk.key_levels.push(KeyLevel::new("zone_low", low));
    walk.key_levels.push(KeyLevel::new("zone_high", high));
    walk.pass(format!("primary {name} {low:.2}-{high:.2}"));

    let mut confidence: f64 = 0.6;
    let last_event = structure.events.last();
    if last_event.is_some_and(|e| e.kind == EventKind::BreakOfStructure && e.direction == bias) {
        walk.reasons.push("last break continues the bias".to_string());
        confidence += 0.1;
    }
    if inputs.context.htf_bias.and_then(|b| b.direction()) == Some(bias) {
        walk.reasons.push("higher-timeframe bias agrees".to_string());
        confidence += 0.1;
    }
    if (low..=high).contains(&last_close) {
        walk.reasons.push("price inside the zone".to_string());
        confidence += 0.05;
    }

    walk.direction = Some(bias);
    walk.confidence = confidence.min(0.95);
    walk
}
