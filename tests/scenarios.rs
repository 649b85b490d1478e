//! End-to-end behaviour of the full pipeline on synthetic series

use chrono::{DateTime, Duration, TimeZone, Utc};

use market_structure::liquidity::{Phase, PoolKind};
use market_structure::scenario::{ScenarioDecision, ScenarioLabel, ScenarioStore, TransitionReason};
use market_structure::structure::{EventKind, RangeState};
use market_structure::zones::{Provenance, ZoneKind};
use market_structure::{analyze, AnalysisConfig, Bar, Bias, Direction, Role, SnapshotInput, Trend};

fn ts(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap() + Duration::minutes(5 * offset)
}

fn ohlc_bars(rows: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: ts(i as i64),
            open,
            high,
            low,
            close,
            volume: 250.0,
        })
        .collect()
}

/// Open at the previous close, 0.25 wick each side
fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let mut prev = closes[0];
    let rows: Vec<_> = closes
        .iter()
        .map(|&close| {
            let open = prev;
            prev = close;
            (open, open.max(close) + 0.25, open.min(close) - 0.25, close)
        })
        .collect();
    ohlc_bars(&rows)
}

fn input(bars: Vec<Bar>) -> SnapshotInput {
    SnapshotInput::new("ES", "5m", bars)
}

fn range_bars() -> Vec<Bar> {
    let mut closes = Vec::new();
    for _ in 0..5 {
        closes.extend([100.0, 105.0, 110.0, 105.0]);
    }
    closes.push(100.0);
    bars_from_closes(&closes)
}

fn breakout_bars() -> Vec<Bar> {
    bars_from_closes(&[
        96.0, 97.0, 98.0, 99.0, 100.0, 101.0, 102.0, 103.0, 102.0, 101.0, 102.0, 104.0, 107.0, 110.0, 113.0,
        112.5, 112.0,
    ])
}

/// Rally that leaves a bullish order block at bar 6, a stop run below it at
/// bar 14 and a bearish break at bar 17
fn breaker_bars() -> Vec<Bar> {
    ohlc_bars(&[
        (100.0, 100.6, 99.8, 100.4),
        (100.4, 101.0, 100.2, 100.8),
        (100.8, 101.4, 100.6, 101.2),
        (101.2, 102.0, 101.0, 101.8),
        (101.8, 102.5, 101.6, 102.2),
        (102.2, 102.3, 101.2, 101.4),
        (101.4, 101.5, 100.6, 100.7),
        (100.7, 101.8, 100.6, 101.6),
        (101.6, 102.9, 101.5, 102.8),
        (102.8, 103.8, 102.6, 103.6),
        (103.6, 104.2, 103.3, 103.9),
        (103.9, 104.0, 102.8, 103.0),
        (103.0, 103.2, 102.0, 102.2),
        (102.2, 102.4, 101.2, 101.4),
        (101.4, 101.6, 100.3, 101.3),
        (101.3, 102.0, 101.1, 101.8),
        (101.8, 102.1, 101.3, 101.5),
        (101.5, 101.6, 99.9, 100.0),
        (100.0, 100.2, 99.0, 99.2),
        (99.2, 99.5, 98.6, 98.8),
        (98.8, 99.6, 98.7, 99.4),
        (99.4, 99.8, 99.0, 99.6),
    ])
}

fn decision(label: ScenarioLabel, direction: Option<Direction>, confidence: f64) -> ScenarioDecision {
    ScenarioDecision {
        label,
        direction,
        confidence,
        reasons: Vec::new(),
        key_levels: Vec::new(),
        unclear_reason: None,
    }
}

#[test]
fn test_monotonic_uptrend() {
    let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
    let analysis = analyze(&input(bars_from_closes(&closes)), &AnalysisConfig::default());

    assert_eq!(analysis.structure.trend, Trend::Up);
    assert!(analysis.structure.events.is_empty());
    assert!(analysis.structure.ote_zones.is_empty());
}

#[test]
fn test_clean_range() {
    let analysis = analyze(&input(range_bars()), &AnalysisConfig::default());

    let range = analysis.structure.active_range.as_ref().unwrap();
    assert_eq!(range.state, RangeState::Inside);
    assert_eq!((range.low, range.high), (99.75, 110.25));

    let pools = &analysis.liquidity.pools;
    assert!(pools
        .iter()
        .any(|p| p.kind == PoolKind::EqualHighs && p.price == 110.25));
    assert!(pools
        .iter()
        .any(|p| p.kind == PoolKind::EqualLows && p.price == 99.75));
    assert_eq!(analysis.liquidity.phase, Phase::Accumulation);
}

#[test]
fn test_impulsive_break_of_prior_high() {
    let analysis = analyze(&input(breakout_bars()), &AnalysisConfig::default());
    let structure = &analysis.structure;

    assert_eq!(structure.events.len(), 1);
    let event = &structure.events[0];
    assert_eq!(event.kind, EventKind::BreakOfStructure);
    assert_eq!(event.direction, Direction::Bullish);
    assert_eq!(event.price, 103.25);
    assert_eq!(event.bar_index, 11);

    let primary: Vec<_> = structure
        .ote_zones
        .iter()
        .filter(|z| z.role == Role::Primary)
        .collect();
    assert_eq!(primary.len(), 1);
    assert_eq!(primary[0].direction, Direction::Bullish);
}

#[test]
fn test_swept_order_block_becomes_breaker() {
    let analysis = analyze(&input(breaker_bars()), &AnalysisConfig::default());
    let zones = &analysis.zones.all;

    let breakers: Vec<_> = zones.iter().filter(|z| z.kind == ZoneKind::Breaker).collect();
    assert_eq!(breakers.len(), 1);
    let breaker = breakers[0];
    assert_eq!(breaker.direction, Direction::Bearish);

    let source_id = breaker
        .provenance
        .iter()
        .find_map(|p| match p {
            Provenance::Zone { id, .. } => Some(*id),
            _ => None,
        })
        .unwrap();
    let source = zones.iter().find(|z| z.id == source_id).unwrap();
    assert_eq!(source.kind, ZoneKind::OrderBlock);
    assert_eq!(source.direction, Direction::Bullish);
    assert_eq!((breaker.low, breaker.high), (source.low, source.high));
}

#[test]
fn test_alternating_raw_labels_never_switch() {
    let mut store = ScenarioStore::new(AnalysisConfig::default().stabilizer);
    let stable = store.observe("ES", decision(ScenarioLabel::Unclear, None, 0.4), ts(0), None);
    assert_eq!(stable.stable.label, ScenarioLabel::Unclear);

    for i in 1..=10 {
        let raw = if i % 2 == 1 {
            decision(ScenarioLabel::TrendContinuation, Some(Direction::Bullish), 0.9)
        } else {
            decision(ScenarioLabel::SweepReversal, Some(Direction::Bearish), 0.9)
        };
        let report = store.observe("ES", raw, ts(i), None);

        assert_eq!(report.stable.label, ScenarioLabel::Unclear);
        assert!(matches!(
            report.transition,
            TransitionReason::PendingConfirmation | TransitionReason::CooldownActive
        ));
    }
}

#[test]
fn test_atr_unavailable_gates_displacement_outputs() {
    let mut config = AnalysisConfig::default();
    config.structure.atr_period = 100;

    let analysis = analyze(&input(range_bars()), &config);

    assert!(analysis.structure.meta.atr.is_none());
    assert!(analysis.structure.events.is_empty());
    assert!(analysis.structure.ote_zones.is_empty());
    assert!(analysis.zones.all.is_empty());
    assert_eq!(analysis.zones.skipped.len(), 4);
    assert!(analysis
        .liquidity
        .pools
        .iter()
        .any(|p| p.kind == PoolKind::EqualHighs));
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let config = AnalysisConfig::default();
    for bars in [range_bars(), breakout_bars(), breaker_bars()] {
        let snapshot_input = input(bars);
        let first = serde_json::to_string(&analyze(&snapshot_input, &config)).unwrap();
        let second = serde_json::to_string(&analyze(&snapshot_input, &config)).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_bias_moves_only_with_choch_or_trend() {
    let config = AnalysisConfig::default();
    let bars = breaker_bars();

    for n in 10..bars.len() {
        let before = analyze(&input(bars[..n].to_vec()), &config).structure;
        let after = analyze(&input(bars[..=n].to_vec()), &config).structure;
        if before.bias == after.bias {
            continue;
        }
        let choch = after.events.iter().any(|e| e.is_choch());
        assert!(choch || after.bias == Bias::from_trend(after.trend));
    }
}

#[test]
fn test_primary_roles_follow_bias() {
    let config = AnalysisConfig::default();
    for bars in [range_bars(), breakout_bars(), breaker_bars()] {
        let analysis = analyze(&input(bars), &config);
        let bias = analysis.structure.bias.direction();

        for pool in &analysis.liquidity.pools {
            if pool.role == Role::Primary {
                assert_eq!(Some(pool.direction), bias);
            }
        }
        for zone in &analysis.zones.all {
            if zone.role == Role::Primary {
                assert_eq!(Some(zone.direction), bias);
            }
        }
    }
}

#[test]
fn test_rerun_keeps_stable_scenario() {
    let config = AnalysisConfig::default();
    let mut store = ScenarioStore::new(config.stabilizer.clone());
    let snapshot_input = input(breaker_bars());

    let first = analyze(&snapshot_input, &config).stabilize(&mut store);
    let second = analyze(&snapshot_input, &config).stabilize(&mut store);

    assert_eq!(first.scenario, second.scenario);
}

#[test]
fn test_snapshot_serializes_to_plain_json() {
    let mut store = ScenarioStore::default();
    let snapshot = analyze(&input(breaker_bars()), &AnalysisConfig::default()).stabilize(&mut store);
    let value = serde_json::to_value(&snapshot).unwrap();

    for key in ["structure", "liquidity", "zones", "scenario", "meta"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["meta"]["symbol"], "ES");
    assert_eq!(value["structure"]["trend"], "DOWN");
    assert_eq!(value["scenario"]["status"], "SETTLED");
}
