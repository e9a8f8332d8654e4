// =============================================================================
// Range oscillators — Williams %R (14), CCI (20), Z-Score (20)
// =============================================================================
//
// Williams %R = (highest high - close) / (highest high - lowest low) * -100
//   < -80 bullish (oversold), > -20 bearish (overbought)
//
// CCI = (typical price - SMA(TP)) / (0.015 * mean deviation)
//   < -100 bullish, > 100 bearish
//
// Z-Score = (close - SMA(close)) / σ(close)
//   < -2 bullish (mean reversion up), > 2 bearish
// =============================================================================

use crate::types::{Bar, IndicatorResult};

pub const WILLIAMS_PERIOD: usize = 14;
pub const CCI_PERIOD: usize = 20;
pub const ZSCORE_PERIOD: usize = 20;

/// Latest Williams %R in [-100, 0]. A zero-width range reads -50.
pub fn williams_r(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let close = window.last()?.close;

    let range = highest - lowest;
    if range <= 0.0 {
        return Some(-50.0);
    }
    let value = (highest - close) / range * -100.0;
    value.is_finite().then_some(value)
}

/// Latest Commodity Channel Index. A window with zero mean deviation reads 0.
pub fn cci(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let typical: Vec<f64> = bars[bars.len() - period..]
        .iter()
        .map(|b| (b.high + b.low + b.close) / 3.0)
        .collect();
    let mean = typical.iter().sum::<f64>() / period as f64;
    let mean_dev = typical.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
    if mean_dev == 0.0 {
        return Some(0.0);
    }
    let value = (typical.last()? - mean) / (0.015 * mean_dev);
    value.is_finite().then_some(value)
}

/// Latest z-score of the close against its `period` mean. Zero σ reads 0.
pub fn z_score(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Some(0.0);
    }
    let z = (window.last()? - mean) / std_dev;
    z.is_finite().then_some(z)
}

/// Strength is the distance past the band edge over the 20-point band.
pub fn classify_williams(value: f64) -> IndicatorResult {
    if value < -80.0 {
        IndicatorResult::bullish(value, (-80.0 - value) / 20.0)
    } else if value > -20.0 {
        IndicatorResult::bearish(value, (value + 20.0) / 20.0)
    } else {
        IndicatorResult::neutral(value)
    }
}

pub fn classify_cci(value: f64) -> IndicatorResult {
    if value < -100.0 {
        IndicatorResult::bullish(value, (value.abs() - 100.0) / 100.0)
    } else if value > 100.0 {
        IndicatorResult::bearish(value, (value - 100.0) / 100.0)
    } else {
        IndicatorResult::neutral(value)
    }
}

pub fn classify_z_score(z: f64) -> IndicatorResult {
    let strength = (z.abs() / 3.0).min(1.0);
    if z < -2.0 {
        IndicatorResult::bullish(z, strength)
    } else if z > 2.0 {
        IndicatorResult::bearish(z, strength)
    } else {
        IndicatorResult::neutral(z)
    }
}
