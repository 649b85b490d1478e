//! Error and degradation types
//!
//! Nothing in the analytical core aborts a snapshot. Bad input bars become
//! [`BarError`] values that are skipped, and stages that cannot produce a
//! result return a neutral value tagged with a [`Degraded`] reason.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Why an input bar was rejected at the boundary
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BarError {
    #[error("bar {index} at {timestamp} has non-finite prices")]
    NonFinite { index: usize, timestamp: DateTime<Utc> },

    #[error("bar {index} at {timestamp} has inconsistent OHLC (high {high}, low {low})")]
    InconsistentOhlc {
        index: usize,
        timestamp: DateTime<Utc>,
        high: f64,
        low: f64,
    },

    #[error("bar {index} at {timestamp} has negative volume")]
    NegativeVolume { index: usize, timestamp: DateTime<Utc> },

    #[error("bar {index} at {timestamp} is not after previous bar at {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// Reason a stage returned an empty or neutral result
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degraded {
    #[error("{stage}: insufficient bars (need {needed}, have {have})")]
    InsufficientBars {
        stage: &'static str,
        needed: usize,
        have: usize,
    },

    #[error("{stage}: ATR unavailable")]
    AtrUnavailable { stage: &'static str },

    #[error("{stage}: no active range")]
    NoActiveRange { stage: &'static str },

    #[error("primary timeframe {timeframe} missing from input")]
    MissingPrimarySeries { timeframe: String },
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("OTE band is inverted: lower {lower} >= upper {upper}")]
    InvertedOteBand { lower: f64, upper: f64 },
}
