// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A single OHLCV bar (oldest first in every slice the engine receives).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            timestamp,
        }
    }
}

/// Reject bar series that would poison every downstream calculation.
///
/// Short series are fine (indicators degrade to neutral); negative or
/// non-finite prices and volumes are not.
pub fn validate_bars(bars: &[Bar]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "bar {i} has a negative or non-finite price (o={}, h={}, l={}, c={})",
                bar.open, bar.high, bar.low, bar.close
            )));
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "bar {i} has a negative or non-finite volume ({})",
                bar.volume
            )));
        }
    }
    Ok(())
}

/// Directional call produced by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT, 0 for HOLD.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Hold => 0.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Directional reading of a single indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalKind {
    /// +1 bullish, -1 bearish, 0 neutral.
    pub fn sign(self) -> f64 {
        match self {
            Self::Bullish => 1.0,
            Self::Bearish => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

/// Output contract shared by every indicator: value, signal, strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub value: f64,
    pub signal: SignalKind,
    /// Conviction in [0, 1].
    pub strength: f64,
}

impl IndicatorResult {
    pub fn bullish(value: f64, strength: f64) -> Self {
        Self::new(value, SignalKind::Bullish, strength)
    }

    pub fn bearish(value: f64, strength: f64) -> Self {
        Self::new(value, SignalKind::Bearish, strength)
    }

    pub fn neutral(value: f64) -> Self {
        Self::new(value, SignalKind::Neutral, 0.0)
    }

    fn new(value: f64, signal: SignalKind, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            value,
            signal,
            strength,
        }
    }

    /// weight × strength × sign(signal).
    pub fn contribution(&self, weight: f64) -> f64 {
        weight * self.strength * self.signal.sign()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Bar {
        Bar::new(close, close, close, close, 1.0, Utc::now())
    }

    #[test]
    fn strength_is_clamped() {
        assert_eq!(IndicatorResult::bullish(1.0, 3.0).strength, 1.0);
        assert_eq!(IndicatorResult::bearish(1.0, -0.5).strength, 0.0);
        assert_eq!(IndicatorResult::bullish(1.0, f64::NAN).strength, 0.0);
    }

    #[test]
    fn contribution_follows_sign() {
        assert!((IndicatorResult::bullish(0.0, 0.5).contribution(10.0) - 5.0).abs() < 1e-12);
        assert!((IndicatorResult::bearish(0.0, 0.5).contribution(10.0) + 5.0).abs() < 1e-12);
        assert_eq!(IndicatorResult::neutral(0.0).contribution(10.0), 0.0);
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(validate_bars(&[bar(10.0), bar(-1.0)]).is_err());
        assert!(validate_bars(&[bar(10.0), bar(f64::NAN)]).is_err());
        assert!(validate_bars(&[]).is_ok());
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Long.to_string(), "LONG");
        assert_eq!(serde_json::to_string(&Direction::Short).unwrap(), "\"SHORT\"");
    }
}
