//! Configuration for the analysis pipeline
//!
//! Every stage reads its own sub-config. All sub-configs deserialize with
//! `#[serde(default)]`, so a JSON file only needs the keys it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Swing detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// Symmetric pivot window `w` (bars each side)
    pub window: usize,
    /// Maximum strength (multiples of `w` the pivot stays extremal for)
    pub strength_cap: u32,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            window: 2,
            strength_cap: 4,
        }
    }
}

/// Legs, trend and break events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub atr_period: usize,
    /// Break displacement must exceed this many ATRs...
    pub break_atr_multiple: f64,
    /// ...and this fraction of the leg's mid price
    pub break_pct_multiple: f64,
    /// Number of recent swing labels that decide the trend
    pub trend_labels: usize,
    /// Only the trailing bars are analyzed
    pub max_lookback_bars: usize,
    /// Close-to-close efficiency required by the drift fallback
    pub drift_efficiency: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            break_atr_multiple: 1.0,
            break_pct_multiple: 0.001,
            trend_labels: 3,
            max_lookback_bars: 500,
            drift_efficiency: 0.7,
        }
    }
}

/// Active trading range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub min_range_bars: usize,
    pub max_range_bars: usize,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            min_range_bars: 8,
            max_range_bars: 120,
        }
    }
}

/// Optimal-trade-entry retracement bands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OteConfig {
    /// Leg amplitude must exceed this many ATRs
    pub leg_min_amplitude_atr: f64,
    pub fib_lower: f64,
    pub fib_upper: f64,
    pub max_zones_per_side: usize,
}

impl Default for OteConfig {
    fn default() -> Self {
        Self {
            leg_min_amplitude_atr: 1.5,
            fib_lower: 0.62,
            fib_upper: 0.79,
            max_zones_per_side: 2,
        }
    }
}

/// Liquidity pools, magnets and phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Equal-level tolerance as a fraction of price (0.001 = 0.1%)
    pub equal_level_tolerance_pct: f64,
    /// A wick counts as "long" from this fraction of the bar range
    pub wick_min_ratio: f64,
    pub wick_cluster_min_touches: usize,
    /// Wick ratio that makes a range-extreme sweep a manipulation
    pub strong_wick_ratio: f64,
    pub max_primary_magnets: usize,
    /// Window (bars) for "just swept" / "new pools forming"
    pub recent_bars: usize,
    /// Close-to-close efficiency that counts as trending cleanly
    pub distribution_efficiency: f64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            equal_level_tolerance_pct: 0.001,
            wick_min_ratio: 0.5,
            wick_cluster_min_touches: 3,
            strong_wick_ratio: 0.6,
            max_primary_magnets: 3,
            recent_bars: 3,
            distribution_efficiency: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBlockConfig {
    /// Body/range ratio above which the zone spans the body only
    pub body_domination_pct: f64,
    /// Minimum body/range ratio for a candidate candle
    pub body_min_pct: f64,
    /// Bars searched backwards from the break
    pub prelude_max_bars: usize,
    /// Active filter: max distance from last close in ATRs
    pub max_distance_atr: f64,
}

impl Default for OrderBlockConfig {
    fn default() -> Self {
        Self {
            body_domination_pct: 0.5,
            body_min_pct: 0.2,
            prelude_max_bars: 10,
            max_distance_atr: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Max bars from block to sweep, and from sweep to opposite break
    pub max_sweep_delay: usize,
    pub level_tolerance_span_ratio: f64,
    pub level_tolerance_pct: f64,
    pub min_displacement_atr: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_sweep_delay: 20,
            level_tolerance_span_ratio: 0.15,
            level_tolerance_pct: 0.0015,
            min_displacement_atr: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
    pub min_gap_atr: f64,
    pub min_gap_pct: f64,
    pub max_age_bars: usize,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            min_gap_atr: 0.25,
            min_gap_pct: 0.0005,
            max_age_bars: 100,
        }
    }
}

/// Point-of-interest merging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiConfig {
    /// Overlap / smaller span at or above which two zones merge
    pub overlap_ratio: f64,
    /// Gap (in ATRs) at or below which two zones merge
    pub gap_atr: f64,
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            overlap_ratio: 0.5,
            gap_atr: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Zones older than this many bars drop out of the active set
    pub lookback_bars: usize,
    pub order_block: OrderBlockConfig,
    pub breaker: BreakerConfig,
    pub imbalance: ImbalanceConfig,
    pub poi: PoiConfig,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            lookback_bars: 300,
            order_block: OrderBlockConfig::default(),
            breaker: BreakerConfig::default(),
            imbalance: ImbalanceConfig::default(),
            poi: PoiConfig::default(),
        }
    }
}

/// Raw scenario classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Bars back a higher-timeframe extreme sweep may have happened
    pub sweep_recent_bars: usize,
    /// Bars back a lower-timeframe break counts as a micro-event
    pub micro_recent_bars: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            sweep_recent_bars: 5,
            micro_recent_bars: 3,
        }
    }
}

/// Hysteresis for the stable scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub confirm_bars: u32,
    pub switch_delta: f64,
    /// Minimum time between two stable switches
    pub cooldown_secs: i64,
    /// Confirmation bars waived by a lower-timeframe micro-event
    pub micro_confirm_discount: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            confirm_bars: 3,
            switch_delta: 0.05,
            cooldown_secs: 900,
            micro_confirm_discount: 1,
        }
    }
}

impl StabilizerConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs)
    }
}

/// The master configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub swing: SwingConfig,
    pub structure: StructureConfig,
    pub range: RangeConfig,
    pub ote: OteConfig,
    pub liquidity: LiquidityConfig,
    pub zones: ZoneConfig,
    pub scenario: ScenarioConfig,
    pub stabilizer: StabilizerConfig,
}

impl AnalysisConfig {
    /// Load from a JSON file and validate
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        positive_usize("swing.window", self.swing.window)?;
        positive_usize("structure.atr_period", self.structure.atr_period)?;
        positive_usize("structure.trend_labels", self.structure.trend_labels)?;
        positive_usize("range.min_range_bars", self.range.min_range_bars)?;
        positive_usize("zones.lookback_bars", self.zones.lookback_bars)?;
        positive_usize("stabilizer.confirm_bars", self.stabilizer.confirm_bars as usize)?;

        unit_interval("ote.fib_lower", self.ote.fib_lower)?;
        unit_interval("ote.fib_upper", self.ote.fib_upper)?;
        if self.ote.fib_lower >= self.ote.fib_upper {
            return Err(ConfigError::InvertedOteBand {
                lower: self.ote.fib_lower,
                upper: self.ote.fib_upper,
            });
        }

        unit_interval(
            "zones.order_block.body_domination_pct",
            self.zones.order_block.body_domination_pct,
        )?;
        unit_interval("zones.order_block.body_min_pct", self.zones.order_block.body_min_pct)?;
        unit_interval("zones.poi.overlap_ratio", self.zones.poi.overlap_ratio)?;
        unit_interval("liquidity.wick_min_ratio", self.liquidity.wick_min_ratio)?;
        unit_interval("stabilizer.switch_delta", self.stabilizer.switch_delta)?;

        if self.liquidity.equal_level_tolerance_pct <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "liquidity.equal_level_tolerance_pct",
            });
        }
        Ok(())
    }
}

fn positive_usize(field: &'static str, value: usize) -> std::result::Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::NotPositive { field })
    } else {
        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.structure.atr_period, 14);
        assert_eq!(config.zones.lookback_bars, 300);
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{ "swing": { "window": 5 }, "stabilizer": { "confirm_bars": 4 } }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.swing.window, 5);
        assert_eq!(config.swing.strength_cap, 4);
        assert_eq!(config.stabilizer.confirm_bars, 4);
        assert_eq!(config.ote.fib_lower, 0.62);
    }

    #[test]
    fn test_inverted_ote_band_rejected() {
        let mut config = AnalysisConfig::default();
        config.ote.fib_lower = 0.8;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedOteBand {
                lower: 0.8,
                upper: 0.79
            })
        );
    }
}
