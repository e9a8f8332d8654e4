// =============================================================================
// Dual-Timeframe Momentum Re-confirmation
// =============================================================================
//
// Before taking an early profit the tracker asks two independent timeframes
// (15M and 1H by default) whether momentum has turned against the trade.
//
// A timeframe shows reversal when, relative to the trade direction,
//   RSI(14) is on the far side of 50   AND   MACD histogram has flipped sign.
//
// Decision rule:
//   exit_confirmed = fast reversal AND slow reversal
// A single-timeframe reversal is noise; the trade runs on toward its target.
// Missing readings never confirm a reversal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::{macd, rsi};
use crate::types::{Bar, Direction};

/// RSI + MACD histogram on one timeframe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumReading {
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
}

impl MomentumReading {
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            rsi: rsi::current_rsi(closes, rsi::RSI_PERIOD),
            macd_histogram: macd::calculate(closes).map(|m| m.histogram),
        }
    }

    pub fn from_bars(bars: &[Bar]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self::from_closes(&closes)
    }

    /// Whether momentum on this timeframe has turned against `direction`.
    pub fn shows_reversal(&self, direction: Direction) -> bool {
        let (Some(rsi), Some(hist)) = (self.rsi, self.macd_histogram) else {
            return false;
        };
        match direction {
            Direction::Long => rsi < 50.0 && hist < 0.0,
            Direction::Short => rsi > 50.0 && hist > 0.0,
            Direction::Hold => false,
        }
    }
}

/// Momentum on two already-fetched timeframes for one coin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DualTimeframeMomentum {
    pub fast: MomentumReading,
    pub slow: MomentumReading,
}

impl DualTimeframeMomentum {
    pub fn new(fast: MomentumReading, slow: MomentumReading) -> Self {
        Self { fast, slow }
    }

    pub fn from_bars(fast_bars: &[Bar], slow_bars: &[Bar]) -> Self {
        Self::new(MomentumReading::from_bars(fast_bars), MomentumReading::from_bars(slow_bars))
    }

    /// True only when both timeframes show reversal against `direction`.
    pub fn confirms_exit(&self, direction: Direction) -> bool {
        let fast = self.fast.shows_reversal(direction);
        let slow = self.slow.shows_reversal(direction);
        if fast != slow {
            debug!(
                direction = %direction,
                fast,
                slow,
                "Single-timeframe reversal treated as noise"
            );
        }
        fast && slow
    }
}
