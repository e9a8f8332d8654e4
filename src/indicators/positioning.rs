// =============================================================================
// Sentiment & positioning readings — contrarian by construction
// =============================================================================
//
// These follow the same value → signal → strength contract as the price
// indicators, but read the crowd and lean against it:
//
//   Fear & Greed (0..100)  < 25 bullish (extreme fear), > 75 bearish (greed)
//   Funding rate (%)       < -0.03 bullish (crowded shorts),
//                          > +0.03 bearish (crowded longs)
//   Basis premium (%)      mirrors funding with a ±0.1 band
//   OI change (%) × price change (%), |ΔOI| >= 1 to count:
//       OI ↑ price ↑  new longs      bullish
//       OI ↑ price ↓  new shorts     bearish
//       OI ↓ price ↑  short squeeze  bullish at half strength
//       OI ↓ price ↓  liquidation    bearish
//   HL volume: 24h volume over its baseline, read like a bar volume spike.

use serde::{Deserialize, Serialize};

use crate::indicators::volume::classify_volume_spike;
use crate::types::IndicatorResult;

pub const FEAR_THRESHOLD: f64 = 25.0;
pub const GREED_THRESHOLD: f64 = 75.0;
pub const FUNDING_THRESHOLD_PCT: f64 = 0.03;
pub const PREMIUM_THRESHOLD_PCT: f64 = 0.1;
pub const OI_MIN_CHANGE_PCT: f64 = 1.0;

/// Derivatives-market context for one coin, as delivered by the market-data
/// provider. Rates are raw fractions (0.0001 = 0.01%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningContext {
    /// Latest funding rate per interval.
    pub funding_rate: f64,
    pub open_interest: f64,
    /// Open interest one lookback period ago, when the provider has it.
    pub open_interest_prev: Option<f64>,
    /// Quote volume traded over the last 24h.
    pub volume_24h: f64,
    /// Baseline 24h volume (average of prior days).
    pub volume_24h_avg: Option<f64>,
    /// (mark - index) / index.
    pub premium: f64,
}

impl PositioningContext {
    pub fn funding_rate_pct(&self) -> f64 {
        self.funding_rate * 100.0
    }

    pub fn premium_pct(&self) -> f64 {
        self.premium * 100.0
    }

    /// Percentage change of open interest, `None` without a usable previous value.
    pub fn oi_change_pct(&self) -> Option<f64> {
        let prev = self.open_interest_prev?;
        if prev <= 0.0 {
            return None;
        }
        let change = (self.open_interest - prev) / prev * 100.0;
        change.is_finite().then_some(change)
    }

    /// 24h volume over its baseline.
    pub fn volume_ratio(&self) -> Option<f64> {
        let avg = self.volume_24h_avg?;
        if avg <= 0.0 {
            return None;
        }
        let ratio = self.volume_24h / avg;
        ratio.is_finite().then_some(ratio)
    }
}

pub fn classify_fear_greed(index: f64) -> IndicatorResult {
    if index < FEAR_THRESHOLD {
        IndicatorResult::bullish(index, (FEAR_THRESHOLD - index) / 25.0)
    } else if index > GREED_THRESHOLD {
        IndicatorResult::bearish(index, (index - GREED_THRESHOLD) / 25.0)
    } else {
        IndicatorResult::neutral(index)
    }
}

/// `rate_pct` is the funding rate per interval in percent (0.01 = 0.01%).
pub fn classify_funding(rate_pct: f64) -> IndicatorResult {
    let strength = (rate_pct.abs() / 0.1).min(1.0);
    if rate_pct < -FUNDING_THRESHOLD_PCT {
        IndicatorResult::bullish(rate_pct, strength)
    } else if rate_pct > FUNDING_THRESHOLD_PCT {
        IndicatorResult::bearish(rate_pct, strength)
    } else {
        IndicatorResult::neutral(rate_pct)
    }
}

/// `premium_pct` is (mark - index) / index in percent.
pub fn classify_premium(premium_pct: f64) -> IndicatorResult {
    let strength = (premium_pct.abs() / 0.5).min(1.0);
    if premium_pct < -PREMIUM_THRESHOLD_PCT {
        IndicatorResult::bullish(premium_pct, strength)
    } else if premium_pct > PREMIUM_THRESHOLD_PCT {
        IndicatorResult::bearish(premium_pct, strength)
    } else {
        IndicatorResult::neutral(premium_pct)
    }
}

/// Four-quadrant reading of open-interest change against price change.
pub fn classify_oi_change(oi_change_pct: f64, price_change_pct: f64) -> IndicatorResult {
    if oi_change_pct.abs() < OI_MIN_CHANGE_PCT || price_change_pct == 0.0 {
        return IndicatorResult::neutral(oi_change_pct);
    }
    let strength = (oi_change_pct.abs() / 10.0).min(1.0);
    match (oi_change_pct > 0.0, price_change_pct > 0.0) {
        (true, true) => IndicatorResult::bullish(oi_change_pct, strength),
        (true, false) => IndicatorResult::bearish(oi_change_pct, strength),
        (false, true) => IndicatorResult::bullish(oi_change_pct, strength * 0.5),
        (false, false) => IndicatorResult::bearish(oi_change_pct, strength),
    }
}

pub fn classify_hl_volume(ratio: f64, price_change_pct: f64) -> IndicatorResult {
    classify_volume_spike(ratio, price_change_pct)
}
