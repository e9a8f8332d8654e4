// =============================================================================
// Relative Strength Index (RSI) and Stochastic RSI — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Price deltas from consecutive closes.
// Step 2 — Seed average gain / loss with the SMA of the first `period` deltas.
// Step 3 — Wilder's smoothing:
//            avg = (prev_avg * (period - 1) + current) / period
// Step 4 — RS = avg_gain / avg_loss, RSI = 100 - 100 / (1 + RS)
//
// Stochastic RSI positions the latest RSI inside its own `stoch_period`
// high/low range, scaled to 0..100.
//
// Thresholds:
//   RSI       < 30 bullish (oversold), > 70 bearish (overbought)
//   StochRSI  < 20 bullish,            > 80 bearish
// =============================================================================

use crate::types::IndicatorResult;

pub const RSI_PERIOD: usize = 14;
pub const STOCH_PERIOD: usize = 14;

/// Compute the full RSI series for `closes`.
///
/// One value per close starting at index `period`. Empty when `period == 0`
/// or fewer than `period + 1` closes are available. A zero average loss
/// yields 100, no movement at all yields 50.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first);

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// Most recent RSI value.
pub fn current_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Most recent Stochastic RSI value in [0, 100].
///
/// A flat RSI window (max == min) reads 50.
pub fn current_stoch_rsi(closes: &[f64], rsi_period: usize, stoch_period: usize) -> Option<f64> {
    if stoch_period == 0 {
        return None;
    }
    let series = calculate_rsi(closes, rsi_period);
    if series.len() < stoch_period {
        return None;
    }

    let window = &series[series.len() - stoch_period..];
    let max = window.iter().cloned().fold(f64::MIN, f64::max);
    let min = window.iter().cloned().fold(f64::MAX, f64::min);
    let last = *window.last()?;

    if (max - min).abs() < f64::EPSILON {
        return Some(50.0);
    }
    Some((last - min) / (max - min) * 100.0)
}

/// RSI < 30 bullish, > 70 bearish; strength is the linear distance past the
/// band edge over 30, capped at 1.
pub fn classify_rsi(rsi: f64) -> IndicatorResult {
    if rsi < 30.0 {
        IndicatorResult::bullish(rsi, (30.0 - rsi) / 30.0)
    } else if rsi > 70.0 {
        IndicatorResult::bearish(rsi, (rsi - 70.0) / 30.0)
    } else {
        IndicatorResult::neutral(rsi)
    }
}

/// StochRSI < 20 bullish, > 80 bearish; strength = distance / 20.
pub fn classify_stoch_rsi(stoch: f64) -> IndicatorResult {
    if stoch < 20.0 {
        IndicatorResult::bullish(stoch, (20.0 - stoch) / 20.0)
    } else if stoch > 80.0 {
        IndicatorResult::bearish(stoch, (stoch - 80.0) / 20.0)
    } else {
        IndicatorResult::neutral(stoch)
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
