// =============================================================================
// Indicator snapshot — every raw reading computed once per scoring call
// =============================================================================
//
// A value is `None` when the bar history was shorter than the indicator's
// lookback or the collaborator that supplies it was unavailable. The snapshot
// travels inside `SignalOutput` so the weight learner can later judge each
// reading against the realised outcome.

use serde::{Deserialize, Serialize};

use crate::indicators::positioning::PositioningContext;
use crate::indicators::{adx, atr, bollinger, ema, ichimoku, macd, oscillators, roc, rsi, volume};
use crate::types::Bar;

/// Bars treated as "one day" when the collaborator gives no 24h context.
const DAY_BARS: usize = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,

    // --- momentum ------------------------------------------------------------
    pub rsi: Option<f64>,
    pub stoch_rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub williams_r: Option<f64>,
    pub cci: Option<f64>,
    pub bollinger_position: Option<f64>,
    pub z_score: Option<f64>,

    // --- trend ---------------------------------------------------------------
    pub ema_alignment: Option<f64>,
    pub ichimoku: Option<f64>,
    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,

    // --- volume --------------------------------------------------------------
    pub obv_delta: Option<f64>,
    pub volume_ratio: Option<f64>,
    /// Change of the latest bar (%).
    pub price_change_pct: Option<f64>,
    /// Change over the last day of bars (%).
    pub price_change_24h_pct: Option<f64>,
    pub hl_volume_ratio: Option<f64>,

    // --- sentiment / positioning ---------------------------------------------
    pub fear_greed: Option<f64>,
    pub funding_rate_pct: Option<f64>,
    pub oi_change_pct: Option<f64>,
    pub premium_pct: Option<f64>,

    /// Volatility scalar for the risk calculator; never weighted.
    pub atr: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compute every reading from the bar history plus optional collaborator
    /// context. Never fails: short history leaves fields empty.
    pub fn compute(bars: &[Bar], sentiment: Option<i64>, positioning: Option<&PositioningContext>) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let macd_reading = macd::calculate(&closes);
        let adx_reading = adx::calculate(bars);
        let bands = bollinger::calculate_bollinger(&closes, bollinger::PERIOD, bollinger::NUM_STD);

        Self {
            close: closes.last().copied(),

            rsi: rsi::current_rsi(&closes, rsi::RSI_PERIOD),
            stoch_rsi: rsi::current_stoch_rsi(&closes, rsi::RSI_PERIOD, rsi::STOCH_PERIOD),
            macd_line: macd_reading.map(|m| m.line),
            macd_histogram: macd_reading.map(|m| m.histogram),
            williams_r: oscillators::williams_r(bars, oscillators::WILLIAMS_PERIOD),
            cci: oscillators::cci(bars, oscillators::CCI_PERIOD),
            bollinger_position: bands.map(|b| b.position),
            z_score: oscillators::z_score(&closes, oscillators::ZSCORE_PERIOD),

            ema_alignment: ema::alignment_score(&closes),
            ichimoku: ichimoku::composite_score(bars),
            adx: adx_reading.map(|r| r.adx),
            plus_di: adx_reading.map(|r| r.plus_di),
            minus_di: adx_reading.map(|r| r.minus_di),

            obv_delta: volume::obv_trend(bars, volume::OBV_PERIOD),
            volume_ratio: volume::volume_ratio(bars, volume::VOLUME_RATIO_PERIOD),
            price_change_pct: roc::current_roc(&closes, 1),
            price_change_24h_pct: roc::recent_change_pct(&closes, DAY_BARS),
            hl_volume_ratio: positioning.and_then(|p| p.volume_ratio()),

            fear_greed: sentiment.filter(|v| (0..=100).contains(v)).map(|v| v as f64),
            funding_rate_pct: positioning.map(|p| p.funding_rate_pct()).filter(|v| v.is_finite()),
            oi_change_pct: positioning.and_then(|p| p.oi_change_pct()),
            premium_pct: positioning.map(|p| p.premium_pct()).filter(|v| v.is_finite()),

            atr: atr::calculate(bars),
        }
    }
}
