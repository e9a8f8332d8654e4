// =============================================================================
// Ichimoku composite (9 / 26 / 52)
// =============================================================================
//
//   Tenkan   = midpoint of the last 9 bars
//   Kijun    = midpoint of the last 26 bars
//   Senkou A = (Tenkan + Kijun) / 2          ┐ plotted 26 bars ahead, so the
//   Senkou B = midpoint of the last 52 bars  ┘ cloud under price today is the
//                                              one computed 26 bars ago
//   Chikou   = close compared with the close 26 bars ago
//
// Composite score in [-100, 100]:
//   price vs cloud  ±40 (0 inside the cloud)
//   Tenkan vs Kijun ±30
//   Chikou          ±30
// ≥ 50 bullish, ≤ -50 bearish, strength |score| / 100.
//
// With 52..77 bars the cloud is taken unshifted from the current bars.
// =============================================================================

use crate::types::{Bar, IndicatorResult};

pub const TENKAN: usize = 9;
pub const KIJUN: usize = 26;
pub const SENKOU_B: usize = 52;
pub const DISPLACEMENT: usize = 26;

/// Composite Ichimoku score, `None` with fewer than 52 bars.
pub fn composite_score(bars: &[Bar]) -> Option<f64> {
    if bars.len() < SENKOU_B {
        return None;
    }

    let close = bars.last()?.close;
    let tenkan = midpoint(bars, TENKAN)?;
    let kijun = midpoint(bars, KIJUN)?;

    let cloud_source = if bars.len() >= SENKOU_B + DISPLACEMENT {
        &bars[..bars.len() - DISPLACEMENT]
    } else {
        bars
    };
    let span_a = (midpoint(cloud_source, TENKAN)? + midpoint(cloud_source, KIJUN)?) / 2.0;
    let span_b = midpoint(cloud_source, SENKOU_B)?;
    let cloud_top = span_a.max(span_b);
    let cloud_bottom = span_a.min(span_b);

    let mut score = 0.0;

    if close > cloud_top {
        score += 40.0;
    } else if close < cloud_bottom {
        score -= 40.0;
    }

    if tenkan > kijun {
        score += 30.0;
    } else if tenkan < kijun {
        score -= 30.0;
    }

    let lagged = bars[bars.len() - 1 - DISPLACEMENT].close;
    if close > lagged {
        score += 30.0;
    } else if close < lagged {
        score -= 30.0;
    }

    Some(score)
}

pub fn classify(score: f64) -> IndicatorResult {
    let strength = score.abs() / 100.0;
    if score >= 50.0 {
        IndicatorResult::bullish(score, strength)
    } else if score <= -50.0 {
        IndicatorResult::bearish(score, strength)
    } else {
        IndicatorResult::neutral(score)
    }
}

/// (highest high + lowest low) / 2 over the last `period` bars.
fn midpoint(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some((high + low) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKind;
    use chrono::Utc;

    fn series(n: usize, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 * (1.0 + step).powi(i as i32);
                Bar::new(c, c * 1.002, c * 0.998, c, 10.0, Utc::now())
            })
            .collect()
    }

    #[test]
    fn needs_52_bars() {
        assert!(composite_score(&series(51, 0.01)).is_none());
        assert!(composite_score(&series(52, 0.01)).is_some());
    }

    #[test]
    fn uptrend_scores_full_bullish() {
        let score = composite_score(&series(100, 0.015)).unwrap();
        assert_eq!(score, 100.0);
        let result = classify(score);
        assert_eq!(result.signal, SignalKind::Bullish);
        assert_eq!(result.strength, 1.0);
    }

    #[test]
    fn downtrend_scores_full_bearish() {
        let score = composite_score(&series(100, -0.015)).unwrap();
        assert_eq!(score, -100.0);
        assert_eq!(classify(score).signal, SignalKind::Bearish);
    }

    #[test]
    fn flat_market_is_neutral() {
        let bars = vec![Bar::new(100.0, 101.0, 99.0, 100.0, 10.0, Utc::now()); 80];
        let score = composite_score(&bars).unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(classify(score).signal, SignalKind::Neutral);
    }
}
