// =============================================================================
// Bollinger Bands (20, 2σ)
// =============================================================================
//
// Middle band = SMA, upper / lower = SMA ± k·σ.
//
// The scoring signal is the close's position inside the bands:
//   position = (close - lower) / (upper - lower)
//   < 0.2 bullish (pressed against the lower band), > 0.8 bearish.
// Band width is kept for volatility diagnostics.

use serde::{Deserialize, Serialize};

use crate::types::IndicatorResult;

pub const PERIOD: usize = 20;
pub const NUM_STD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle * 100
    pub width: f64,
    /// Close position inside the bands; 0.5 when the bands collapse.
    pub position: f64,
}

/// Bollinger Bands over the last `period` closes.
///
/// Returns `None` with fewer than `period` closes or a zero middle band.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    let close = *window.last()?;
    let position = if upper - lower > 0.0 {
        (close - lower) / (upper - lower)
    } else {
        0.5
    };

    (width.is_finite() && position.is_finite()).then_some(BollingerResult {
        upper,
        middle,
        lower,
        width,
        position,
    })
}

pub fn classify_position(position: f64) -> IndicatorResult {
    if position < 0.2 {
        IndicatorResult::bullish(position, (0.2 - position) / 0.2)
    } else if position > 0.8 {
        IndicatorResult::bearish(position, (position - 0.8) / 0.2)
    } else {
        IndicatorResult::neutral(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKind;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!(bb.width > 0.0);
        assert!(bb.position > 0.8);
    }

    #[test]
    fn bollinger_insufficient_data() {
        assert!(calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat() {
        let bb = calculate_bollinger(&[100.0; 20], 20, 2.0).unwrap();
        assert!(bb.width.abs() < 1e-10);
        assert_eq!(bb.position, 0.5);
        assert_eq!(classify_position(bb.position).signal, SignalKind::Neutral);
    }

    #[test]
    fn position_classification() {
        let low = classify_position(0.05);
        assert_eq!(low.signal, SignalKind::Bullish);
        assert!((low.strength - 0.75).abs() < 1e-12);
        assert_eq!(classify_position(1.3).strength, 1.0);
    }
}
