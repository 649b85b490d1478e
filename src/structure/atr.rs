//! Volatility helpers shared by the structure and zone stages

use crate::types::Bar;

/// Average True Range over the last `period` bars.
///
/// Needs `period + 1` bars (each true range looks at the previous close).
/// Returns `None` when the series is too short or the result is not a
/// strictly positive finite number; displacement-based detectors treat that
/// as "no ATR" and stand down.
pub fn average_true_range(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let tail = &bars[bars.len() - period - 1..];
    let sum_tr: f64 = tail
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .sum();
    let atr = sum_tr / period as f64;

    (atr.is_finite() && atr > 0.0).then_some(atr)
}

/// Close-to-close drift over a window: `(net change, efficiency)` where
/// efficiency is `|net| / sum(|step|)` in [0, 1].
pub fn close_drift(bars: &[Bar]) -> Option<(f64, f64)> {
    if bars.len() < 3 {
        return None;
    }

    let net = bars[bars.len() - 1].close - bars[0].close;
    let path: f64 = bars
        .windows(2)
        .map(|pair| (pair[1].close - pair[0].close).abs())
        .sum();

    if path <= 0.0 {
        return None;
    }
    Some((net, net.abs() / path))
}

/// Number of times consecutive closes cross `level`
pub fn count_crosses(bars: &[Bar], level: f64) -> u32 {
    if bars.len() < 2 {
        return 0;
    }

    let mut crosses = 0u32;
    let mut prev_above = bars[0].close > level;

    for bar in bars.iter().skip(1) {
        let curr_above = bar.close > level;
        if curr_above != prev_above {
            crosses += 1;
        }
        prev_above = curr_above;
    }

    crosses
}
