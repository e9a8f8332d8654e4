// =============================================================================
// Exponential Moving Average (EMA) and EMA-Alignment (7 / 21 / 50)
// =============================================================================
//
// EMA gives more weight to recent prices:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first EMA value is seeded with the SMA of the first `period` closes.
//
// EMA-Alignment scores the 7/21/50 stack on a 0..100 scale, 25 points each:
//   close > EMA7, EMA7 > EMA21, EMA21 > EMA50, EMA50 rising.
// A fully bullish stack scores 100, a fully bearish one scores 0, a flat one 50.
// =============================================================================

use crate::types::IndicatorResult;

/// Periods of the alignment stack.
pub const ALIGNMENT_PERIODS: (usize, usize, usize) = (7, 21, 50);

/// Compute the EMA series for `closes` and look-back `period`.
///
/// Each output element corresponds to a close starting at index `period - 1`.
/// Returns an empty vec when `period == 0` or `closes.len() < period`; a
/// non-finite value truncates the series.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// EMA-Alignment score in [0, 100].
///
/// Returns `None` with fewer than 51 closes (EMA-50 plus one bar of slope).
pub fn alignment_score(closes: &[f64]) -> Option<f64> {
    let (fast, mid, slow) = ALIGNMENT_PERIODS;
    if closes.len() < slow + 1 {
        return None;
    }

    let ema_fast = *calculate_ema(closes, fast).last()?;
    let ema_mid = *calculate_ema(closes, mid).last()?;
    let slow_series = calculate_ema(closes, slow);
    if slow_series.len() < 2 {
        return None;
    }
    let ema_slow = slow_series[slow_series.len() - 1];
    let ema_slow_prev = slow_series[slow_series.len() - 2];
    let close = *closes.last()?;

    let pairs = [
        (close, ema_fast),
        (ema_fast, ema_mid),
        (ema_mid, ema_slow),
        (ema_slow, ema_slow_prev),
    ];
    let score = pairs.iter().map(|&(a, b)| stack_points(a, b)).sum();
    Some(score)
}

/// 25 points when `upper` is strictly above `lower`, none when below, half
/// when the two are indistinguishable.
fn stack_points(upper: f64, lower: f64) -> f64 {
    let tolerance = lower.abs() * 1e-9;
    if upper > lower + tolerance {
        25.0
    } else if upper < lower - tolerance {
        0.0
    } else {
        12.5
    }
}

/// Bullish when the score is >= 75, bearish when the inverse (100 - score)
/// is >= 75. Strength = |score - 50| / 50.
pub fn classify_alignment(score: f64) -> IndicatorResult {
    let strength = (score - 50.0).abs() / 50.0;
    if score >= 75.0 {
        IndicatorResult::bullish(score, strength)
    } else if 100.0 - score >= 75.0 {
        IndicatorResult::bearish(score, strength)
    } else {
        IndicatorResult::neutral(score)
    }
}
