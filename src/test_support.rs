//! Synthetic bar builders for unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::Bar;

/// Minute `offset` after a fixed session open
pub fn ts(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap() + Duration::minutes(offset)
}

/// Bars from `(open, high, low, close)` tuples, one minute apart
pub fn ohlc_bars(rows: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: ts(i as i64),
            open,
            high,
            low,
            close,
            volume: 100.0,
        })
        .collect()
}

/// Bars that open at the previous close with a 0.25 wick on each side
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let mut prev = closes.first().copied().unwrap_or_default();
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
