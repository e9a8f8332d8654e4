// =============================================================================
// Average Directional Index (ADX) with +DI / -DI
// =============================================================================
//
// Calculation pipeline:
//   1. +DM / -DM and True Range per bar.
//   2. Wilder's smoothing (period) of +DM, -DM, TR.
//   3. +DI = smoothed(+DM) / smoothed(TR) * 100, -DI likewise.
//   4. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   5. ADX = Wilder's smoothed average of DX.
//
// Scoring: ADX <= 25 is neutral (no trend worth following). Above 25 the
// signal follows the dominant DI, strength = (ADX - 25) / 50 capped at 1.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::{Bar, IndicatorResult};

pub const PERIOD: usize = 14;

/// Trend-strength threshold separating trending from ranging markets.
pub const TREND_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxReading {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Most recent ADX reading.
///
/// Returns `None` when `period` is zero, there are fewer than `2 * period + 1`
/// bars, or any intermediate value is non-finite.
pub fn calculate_adx(bars: &[Bar], period: usize) -> Option<AdxReading> {
    if period == 0 || bars.len() < 2 * period + 1 {
        return None;
    }

    let period_f = period as f64;

    // ------------------------------------------------------------------
    // Raw +DM, -DM and True Range for each consecutive pair
    // ------------------------------------------------------------------
    let transitions = bars.len() - 1;
    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut tr_vals = Vec::with_capacity(transitions);

    for pair in bars.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        tr_vals.push(tr);
    }

    // ------------------------------------------------------------------
    // Wilder's smoothing, collecting one DX per step
    // ------------------------------------------------------------------
    let mut smooth_plus: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = tr_vals[..period].iter().sum();

    let mut dx_values: Vec<f64> = Vec::with_capacity(transitions - period + 1);
    let mut last_di = directional_indices(smooth_plus, smooth_minus, smooth_tr)?;
    dx_values.push(last_di.2);

    for i in period..transitions {
        smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[i];
        smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_vals[i];

        last_di = directional_indices(smooth_plus, smooth_minus, smooth_tr)?;
        dx_values.push(last_di.2);
    }

    if dx_values.len() < period {
        return None;
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
    }

    adx.is_finite().then_some(AdxReading {
        adx,
        plus_di: last_di.0,
        minus_di: last_di.1,
    })
}

/// ADX with the standard 14-period default.
pub fn calculate(bars: &[Bar]) -> Option<AdxReading> {
    calculate_adx(bars, PERIOD)
}

pub fn classify_adx(reading: &AdxReading) -> IndicatorResult {
    if reading.adx <= TREND_THRESHOLD {
        return IndicatorResult::neutral(reading.adx);
    }
    let strength = ((reading.adx - TREND_THRESHOLD) / 50.0).min(1.0);
    if reading.plus_di > reading.minus_di {
        IndicatorResult::bullish(reading.adx, strength)
    } else if reading.minus_di > reading.plus_di {
        IndicatorResult::bearish(reading.adx, strength)
    } else {
        IndicatorResult::neutral(reading.adx)
    }
}

/// (+DI, -DI, DX) from smoothed values. A zero TR yields no reading.
fn directional_indices(smooth_plus: f64, smooth_minus: f64, smooth_tr: f64) -> Option<(f64, f64, f64)> {
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = smooth_plus / smooth_tr * 100.0;
    let minus_di = smooth_minus / smooth_tr * 100.0;
    let di_sum = plus_di + minus_di;
    let dx = if di_sum == 0.0 {
        0.0
    } else {
        (plus_di - minus_di).abs() / di_sum * 100.0
    };
    dx.is_finite().then_some((plus_di, minus_di, dx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKind;
    use chrono::Utc;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(open, high, low, close, 1.0, Utc::now())
    }

    #[test]
    fn adx_period_zero() {
        let bars = vec![bar(1.0, 2.0, 0.5, 1.5); 50];
        assert!(calculate_adx(&bars, 0).is_none());
    }

    #[test]
    fn adx_insufficient_data() {
        let bars = vec![bar(1.0, 2.0, 0.5, 1.5); 10];
        assert!(calculate(&bars).is_none());
    }

    #[test]
    fn adx_strong_uptrend() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                bar(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let reading = calculate(&bars).unwrap();
        assert!(reading.adx > 25.0, "expected ADX > 25, got {}", reading.adx);
        assert!(reading.plus_di > reading.minus_di);
        assert_eq!(classify_adx(&reading).signal, SignalKind::Bullish);
    }

    #[test]
    fn adx_strong_downtrend_is_bearish() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let base = 300.0 - i as f64 * 2.0;
                bar(base, base + 0.5, base - 1.5, base - 1.0)
            })
            .collect();
        let reading = calculate(&bars).unwrap();
        assert!(reading.minus_di > reading.plus_di);
        assert_eq!(classify_adx(&reading).signal, SignalKind::Bearish);
    }

    #[test]
    fn adx_flat_market_is_neutral() {
        let bars = vec![bar(100.0, 101.0, 99.0, 100.0); 60];
        let reading = calculate(&bars).unwrap();
        assert!(reading.adx < 1.0, "expected ADX near 0, got {}", reading.adx);
        assert_eq!(classify_adx(&reading).signal, SignalKind::Neutral);
    }

    #[test]
    fn adx_minimum_bars_exact() {
        let period = 5;
        let min = 2 * period + 1;
        let bars: Vec<Bar> = (0..min)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(base, base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(calculate_adx(&bars, period).is_some());
        assert!(calculate_adx(&bars[..min - 1], period).is_none());
    }

    #[test]
    fn strength_is_capped() {
        let reading = AdxReading { adx: 90.0, plus_di: 40.0, minus_di: 5.0 };
        assert_eq!(classify_adx(&reading).strength, 1.0);
    }
}
