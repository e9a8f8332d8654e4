// =============================================================================
// MACD (12, 26, 9)
// =============================================================================
//
//   MACD line = EMA(12) - EMA(26)
//   Signal    = EMA(9) of the MACD line
//   Histogram = MACD line - Signal
//
// Bullish when histogram and line are both positive, bearish when both are
// negative. Strength = |histogram| / |line|, capped at 1.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::ema::calculate_ema;
use crate::types::IndicatorResult;

pub const FAST: usize = 12;
pub const SLOW: usize = 26;
pub const SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Most recent MACD reading.
///
/// Needs `slow + signal - 1` closes so the signal EMA has a seed.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdReading> {
    if fast == 0 || slow <= fast || signal == 0 || closes.len() < slow + signal - 1 {
        return None;
    }

    let fast_series = calculate_ema(closes, fast);
    let slow_series = calculate_ema(closes, slow);

    // Align both series on the close index: fast starts at fast-1, slow at slow-1.
    let offset = slow - fast;
    if fast_series.len() < offset + slow_series.len() {
        return None;
    }
    let macd_series: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = calculate_ema(&macd_series, signal);
    let line = *macd_series.last()?;
    let signal_value = *signal_series.last()?;

    Some(MacdReading {
        line,
        signal: signal_value,
        histogram: line - signal_value,
    })
}

/// MACD with the standard 12/26/9 periods.
pub fn calculate(closes: &[f64]) -> Option<MacdReading> {
    calculate_macd(closes, FAST, SLOW, SIGNAL)
}

pub fn classify_macd(line: f64, histogram: f64) -> IndicatorResult {
    let strength = if line.abs() > f64::EPSILON {
        (histogram.abs() / line.abs()).min(1.0)
    } else {
        0.0
    };
    if histogram > 0.0 && line > 0.0 {
        IndicatorResult::bullish(histogram, strength)
    } else if histogram < 0.0 && line < 0.0 {
        IndicatorResult::bearish(histogram, strength)
    } else {
        IndicatorResult::neutral(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKind;

    #[test]
    fn macd_insufficient_data() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        assert!(calculate(&closes).is_none());
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
    }

    #[test]
    fn macd_minimum_history() {
        let closes: Vec<f64> = (1..=34).map(|x| x as f64).collect();
        assert!(calculate(&closes).is_some());
    }

    #[test]
    fn macd_accelerating_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 * 1.015_f64.powi(i)).collect();
        let reading = calculate(&closes).unwrap();
        assert!(reading.line > 0.0);
        assert!(reading.histogram > 0.0);
        assert_eq!(classify_macd(reading.line, reading.histogram).signal, SignalKind::Bullish);
    }

    #[test]
    fn macd_downtrend_line_negative() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 * 0.985_f64.powi(i)).collect();
        let reading = calculate(&closes).unwrap();
        assert!(reading.line < 0.0);
    }

    #[test]
    fn macd_mixed_signs_are_neutral() {
        assert_eq!(classify_macd(1.0, -0.2).signal, SignalKind::Neutral);
        let strong = classify_macd(0.5, 2.0);
        assert_eq!(strong.strength, 1.0);
    }
}
