// Library crate - market-structure analysis core and its per-symbol host

pub mod cache;
pub mod config;
pub mod error;
pub mod liquidity;
pub mod scenario;
pub mod snapshot;
pub mod structure;
pub mod types;
pub mod worker;
pub mod zones;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::AnalysisConfig;
pub use error::{BarError, ConfigError, Degraded};
pub use scenario::{ScenarioLabel, ScenarioStore};
pub use snapshot::{analyze, snapshot, Analysis, Snapshot, SnapshotInput};
pub use types::*;
pub use worker::{analyze_batch, Engine};
