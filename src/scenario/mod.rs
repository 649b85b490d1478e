//! Scenario layer
//!
//! [`classify`] is the stateless raw decision for one snapshot; the
//! [`ScenarioStore`] keeps the per-symbol stable scenario on top of it.

pub mod classifier;
pub mod stabilizer;

pub use classifier::{classify, ClassifierInputs, KeyLevel, ScenarioDecision, ScenarioLabel, UnclearReason};
pub use stabilizer::{
    ScenarioReport, ScenarioStatus, ScenarioStore, StableScenarioState, TransitionReason,
};
