//! Stabilization state machine
//!
//! Turns the per-snapshot raw decision into a slowly changing stable
//! scenario. A candidate replaces the stable scenario only when the cooldown
//! since the last switch has elapsed, it has been the raw output for enough
//! consecutive snapshots, and its confidence beats the stable one by the
//! configured delta. State lives per symbol in a [`ScenarioStore`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::classifier::{KeyLevel, ScenarioDecision, ScenarioLabel};
use crate::config::StabilizerConfig;
use crate::types::Direction;

/// Why the last observation did or did not change the stable scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionReason {
    FirstObservation,
    MatchesStable,
    CooldownActive,
    PendingConfirmation,
    InsufficientConfidence,
    Switched,
    OutOfOrder,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionReason::FirstObservation => write!(f, "first observation"),
            TransitionReason::MatchesStable => write!(f, "raw matches stable"),
            TransitionReason::CooldownActive => write!(f, "cooldown active"),
            TransitionReason::PendingConfirmation => write!(f, "pending confirmation"),
            TransitionReason::InsufficientConfidence => write!(f, "insufficient confidence"),
            TransitionReason::Switched => write!(f, "switched"),
            TransitionReason::OutOfOrder => write!(f, "out-of-order snapshot ignored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSwitch {
    pub label: ScenarioLabel,
    pub direction: Option<Direction>,
    /// Consecutive snapshots the candidate has been the raw output
    pub count: u32,
    pub confidence: f64,
    pub since: DateTime<Utc>,
}

/// Per-symbol stabilization record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StableScenarioState {
    pub stable: ScenarioDecision,
    pub raw: ScenarioDecision,
    pub pending: Option<PendingSwitch>,
    pub stable_since: DateTime<Utc>,
    /// Earliest time the next switch is allowed
    pub next_switch_at: DateTime<Utc>,
    pub last_as_of: DateTime<Utc>,
    pub last_reason: TransitionReason,
    /// Confirmation bars required for the current candidate
    pub required_confirmations: u32,
}

impl StableScenarioState {
    /// Created on first observation: the raw decision becomes stable
    pub fn new(raw: ScenarioDecision, as_of: DateTime<Utc>, config: &StabilizerConfig) -> Self {
        Self {
            stable: raw.clone(),
            raw,
            pending: None,
            stable_since: as_of,
            next_switch_at: as_of + config.cooldown(),
            last_as_of: as_of,
            last_reason: TransitionReason::FirstObservation,
            required_confirmations: config.confirm_bars,
        }
    }

    /// Feed one raw decision. `micro` is the direction of a recent
    /// lower-timeframe break, if any; it can only shorten confirmation.
    pub fn observe(
        &mut self,
        raw: ScenarioDecision,
        as_of: DateTime<Utc>,
        micro: Option<Direction>,
        config: &StabilizerConfig,
    ) -> TransitionReason {
        if as_of == self.last_as_of {
            return self.last_reason;
        }
        if as_of < self.last_as_of {
            warn!(
                "snapshot at {} is older than last observed {}; ignored",
                as_of, self.last_as_of
            );
            self.last_reason = TransitionReason::OutOfOrder;
            return self.last_reason;
        }

        self.last_as_of = as_of;
        self.raw = raw.clone();

        if raw.key() == self.stable.key() {
            self.pending = None;
            self.required_confirmations = config.confirm_bars;
            self.stable = raw;
            self.last_reason = TransitionReason::MatchesStable;
            return self.last_reason;
        }

        let pending = match self.pending.take() {
            Some(mut p) if (p.label, p.direction) == raw.key() => {
                p.count += 1;
                p.confidence = raw.confidence;
                p
            }
            _ => PendingSwitch {
                label: raw.label,
                direction: raw.direction,
                count: 1,
                confidence: raw.confidence,
                since: as_of,
            },
        };

        let discount = match (micro, raw.direction) {
            (Some(m), Some(d)) if m == d => config.micro_confirm_discount,
            _ => 0,
        };
        let required = config.confirm_bars.saturating_sub(discount).max(1);
        self.required_confirmations = required;

        let reason = if as_of < self.next_switch_at {
            TransitionReason::CooldownActive
        } else if pending.count < required {
            TransitionReason::PendingConfirmation
        } else if self.stable.label != ScenarioLabel::Unclear
            && raw.confidence < self.stable.confidence + config.switch_delta
        {
            TransitionReason::InsufficientConfidence
        } else {
            TransitionReason::Switched
        };

        if reason == TransitionReason::Switched {
            info!(
                "stable scenario {} {:?} -> {} {:?} (confidence {:.2} -> {:.2})",
                self.stable.label,
                self.stable.direction,
                raw.label,
                raw.direction,
                self.stable.confidence,
                raw.confidence
            );
            self.stable = raw;
            self.stable_since = as_of;
            self.next_switch_at = as_of + config.cooldown();
            self.pending = None;
            self.required_confirmations = config.confirm_bars;
        } else {
            self.pending = Some(pending);
        }

        self.last_reason = reason;
        reason
    }

    /// Settled when the raw output agrees with the stable one
    pub fn is_settled(&self) -> bool {
        self.pending.is_none() && self.raw.key() == self.stable.key()
    }

    pub fn report(&self) -> ScenarioReport {
        let mut reasons = vec![self.last_reason.to_string()];
        reasons.extend(self.stable.reasons.iter().cloned());

        ScenarioReport {
            stable: DecisionSummary::from(&self.stable),
            raw: DecisionSummary::from(&self.raw),
            pending: self.pending.as_ref().map(|p| PendingSummary {
                label: p.label,
                direction: p.direction,
                count: p.count,
                required: self.required_confirmations,
            }),
            status: if self.is_settled() {
                ScenarioStatus::Settled
            } else {
                ScenarioStatus::Fluctuating
            },
            transition: self.last_reason,
            reasons,
            key_levels: self.stable.key_levels.clone(),
            stable_since: self.stable_since,
            next_switch_at: self.next_switch_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Settled,
    Fluctuating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionSummary {
    pub label: ScenarioLabel,
    pub direction: Option<Direction>,
    pub confidence: f64,
}

impl From<&ScenarioDecision> for DecisionSummary {
    fn from(decision: &ScenarioDecision) -> Self {
        Self {
            label: decision.label,
            direction: decision.direction,
            confidence: decision.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSummary {
    pub label: ScenarioLabel,
    pub direction: Option<Direction>,
    pub count: u32,
    pub required: u32,
}

/// The `scenario` section of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub stable: DecisionSummary,
    pub raw: DecisionSummary,
    pub pending: Option<PendingSummary>,
    pub status: ScenarioStatus,
    pub transition: TransitionReason,
    /// Transition reason first, then the stable decision's reasons
    pub reasons: Vec<String>,
    pub key_levels: Vec<KeyLevel>,
    pub stable_since: DateTime<Utc>,
    pub next_switch_at: DateTime<Utc>,
}

/// Stabilization records keyed by symbol. A record is created on the first
/// observation of a symbol and updated on every later one.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    config: StabilizerConfig,
    states: HashMap<String, StableScenarioState>,
}

impl ScenarioStore {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn observe(
        &mut self,
        symbol: &str,
        raw: ScenarioDecision,
        as_of: DateTime<Utc>,
        micro: Option<Direction>,
    ) -> ScenarioReport {
        match self.states.get_mut(symbol) {
            Some(state) => {
                state.observe(raw, as_of, micro, &self.config);
                state.report()
            }
            None => {
                info!("{}: first scenario observation ({})", symbol, raw.label);
                let state = StableScenarioState::new(raw, as_of, &self.config);
                let report = state.report();
                self.states.insert(symbol.to_string(), state);
                report
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&StableScenarioState> {
        self.states.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
