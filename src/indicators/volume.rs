// =============================================================================
// Volume indicators — OBV-Trend (7) and Volume-Ratio (20)
// =============================================================================
//
// OBV-Trend: the change in On-Balance Volume over the last `period` bars,
// normalised by the total volume traded in those bars. The result lives in
// [-1, 1]: +1 means every bar of the window closed up.
//   Δ > 0.5 bullish, Δ < -0.5 bearish, strength |Δ|.
//
// Volume-Ratio: latest volume over the average of the preceding `period`
// bars. A ratio above 1.5 confirms the bar's direction:
//   ratio > 1.5 & price up → bullish, ratio > 1.5 & price down → bearish,
//   strength (ratio - 1) / 2 capped at 1.
// =============================================================================

use crate::types::{Bar, IndicatorResult};

pub const OBV_PERIOD: usize = 7;
pub const VOLUME_RATIO_PERIOD: usize = 20;

/// Volume spike threshold shared by the volume-ratio and HL-volume readings.
pub const SPIKE_RATIO: f64 = 1.5;

/// Normalised OBV change over the last `period` bars.
///
/// Returns `None` with fewer than `period + 1` bars; a window with no volume
/// reads 0.
pub fn obv_trend(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let window = &bars[bars.len() - period - 1..];
    let mut delta = 0.0;
    let mut traded = 0.0;
    for pair in window.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        traded += cur.volume;
        if cur.close > prev.close {
            delta += cur.volume;
        } else if cur.close < prev.close {
            delta -= cur.volume;
        }
    }

    if traded == 0.0 {
        return Some(0.0);
    }
    let normalised = delta / traded;
    normalised.is_finite().then_some(normalised)
}

/// Latest volume over the mean of the `period` bars before it.
pub fn volume_ratio(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let latest = bars.last()?.volume;
    let prior = &bars[bars.len() - period - 1..bars.len() - 1];
    let average = prior.iter().map(|b| b.volume).sum::<f64>() / period as f64;
    if average == 0.0 {
        return None;
    }
    let ratio = latest / average;
    ratio.is_finite().then_some(ratio)
}

pub fn classify_obv(delta: f64) -> IndicatorResult {
    if delta > 0.5 {
        IndicatorResult::bullish(delta, delta.abs())
    } else if delta < -0.5 {
        IndicatorResult::bearish(delta, delta.abs())
    } else {
        IndicatorResult::neutral(delta)
    }
}

/// Classify a volume spike given the accompanying price change (%).
///
/// Shared by the bar-level volume ratio and the 24h HL-volume ratio.
pub fn classify_volume_spike(ratio: f64, price_change_pct: f64) -> IndicatorResult {
    if ratio <= SPIKE_RATIO {
        return IndicatorResult::neutral(ratio);
    }
    let strength = (ratio - 1.0) / 2.0;
    if price_change_pct > 0.0 {
        IndicatorResult::bullish(ratio, strength)
    } else if price_change_pct < 0.0 {
        IndicatorResult::bearish(ratio, strength)
    } else {
        IndicatorResult::neutral(ratio)
    }
}
