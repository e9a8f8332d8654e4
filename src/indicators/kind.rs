// =============================================================================
// Indicator kinds — the closed set of weighted indicators
// =============================================================================
//
// Each variant owns everything the engine needs to know about it:
//
//   name / category / default weight
//   classify  — snapshot value → bullish | bearish | neutral + strength
//   supports  — did the reading point the same way as a given trade?
//
// `supports` uses looser, direction-aware thresholds than `classify`. The
// weight learner evaluates it on LOST trades (a supporting reading was
// confidently wrong) and on WON trades (a supporting reading was correct).
// Adding a variant without filling in every match arm is a compile error.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::indicators::snapshot::IndicatorSnapshot;
use crate::indicators::{adx, bollinger, ema, ichimoku, macd, oscillators, positioning, rsi, volume};
use crate::types::{Direction, IndicatorResult};

/// Scoring category an indicator's contribution is summed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Momentum,
    Trend,
    Volume,
    Sentiment,
    Positioning,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Momentum,
        Category::Trend,
        Category::Volume,
        Category::Sentiment,
        Category::Positioning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Momentum => "momentum",
            Self::Trend => "trend",
            Self::Volume => "volume",
            Self::Sentiment => "sentiment",
            Self::Positioning => "positioning",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    StochRsi,
    Macd,
    WilliamsR,
    Cci,
    Bollinger,
    ZScore,
    EmaAlignment,
    Ichimoku,
    Adx,
    Obv,
    VolumeRatio,
    HlVolume,
    FearGreed,
    FundingRate,
    OiChange,
    BasisPremium,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 17] = [
        IndicatorKind::Rsi,
        IndicatorKind::StochRsi,
        IndicatorKind::Macd,
        IndicatorKind::WilliamsR,
        IndicatorKind::Cci,
        IndicatorKind::Bollinger,
        IndicatorKind::ZScore,
        IndicatorKind::EmaAlignment,
        IndicatorKind::Ichimoku,
        IndicatorKind::Adx,
        IndicatorKind::Obv,
        IndicatorKind::VolumeRatio,
        IndicatorKind::HlVolume,
        IndicatorKind::FearGreed,
        IndicatorKind::FundingRate,
        IndicatorKind::OiChange,
        IndicatorKind::BasisPremium,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::StochRsi => "stoch_rsi",
            Self::Macd => "macd",
            Self::WilliamsR => "williams_r",
            Self::Cci => "cci",
            Self::Bollinger => "bollinger",
            Self::ZScore => "z_score",
            Self::EmaAlignment => "ema_alignment",
            Self::Ichimoku => "ichimoku",
            Self::Adx => "adx",
            Self::Obv => "obv",
            Self::VolumeRatio => "volume_ratio",
            Self::HlVolume => "hl_volume",
            Self::FearGreed => "fear_greed",
            Self::FundingRate => "funding_rate",
            Self::OiChange => "oi_change",
            Self::BasisPremium => "basis_premium",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::Rsi
            | Self::StochRsi
            | Self::Macd
            | Self::WilliamsR
            | Self::Cci
            | Self::Bollinger
            | Self::ZScore => Category::Momentum,
            Self::EmaAlignment | Self::Ichimoku | Self::Adx => Category::Trend,
            Self::Obv | Self::VolumeRatio | Self::HlVolume => Category::Volume,
            Self::FearGreed => Category::Sentiment,
            Self::FundingRate | Self::OiChange | Self::BasisPremium => Category::Positioning,
        }
    }

    /// Factory weight. The full set sums to 100.
    pub fn default_weight(self) -> f64 {
        match self {
            Self::Rsi => 8.0,
            Self::StochRsi => 5.0,
            Self::Macd => 8.0,
            Self::WilliamsR => 4.0,
            Self::Cci => 4.0,
            Self::Bollinger => 5.0,
            Self::ZScore => 4.0,
            Self::EmaAlignment => 10.0,
            Self::Ichimoku => 8.0,
            Self::Adx => 7.0,
            Self::Obv => 6.0,
            Self::VolumeRatio => 6.0,
            Self::HlVolume => 3.0,
            Self::FearGreed => 7.0,
            Self::FundingRate => 7.0,
            Self::OiChange => 5.0,
            Self::BasisPremium => 3.0,
        }
    }

    /// Classify this indicator's reading. `None` when the snapshot lacks the
    /// value; the scorer treats that as neutral.
    pub fn classify(self, snap: &IndicatorSnapshot) -> Option<IndicatorResult> {
        let result = match self {
            Self::Rsi => rsi::classify_rsi(snap.rsi?),
            Self::StochRsi => rsi::classify_stoch_rsi(snap.stoch_rsi?),
            Self::Macd => macd::classify_macd(snap.macd_line?, snap.macd_histogram?),
            Self::WilliamsR => oscillators::classify_williams(snap.williams_r?),
            Self::Cci => oscillators::classify_cci(snap.cci?),
            Self::Bollinger => bollinger::classify_position(snap.bollinger_position?),
            Self::ZScore => oscillators::classify_z_score(snap.z_score?),
            Self::EmaAlignment => ema::classify_alignment(snap.ema_alignment?),
            Self::Ichimoku => ichimoku::classify(snap.ichimoku?),
            Self::Adx => adx::classify_adx(&adx::AdxReading {
                adx: snap.adx?,
                plus_di: snap.plus_di?,
                minus_di: snap.minus_di?,
            }),
            Self::Obv => volume::classify_obv(snap.obv_delta?),
            Self::VolumeRatio => volume::classify_volume_spike(snap.volume_ratio?, snap.price_change_pct?),
            Self::HlVolume => positioning::classify_hl_volume(snap.hl_volume_ratio?, snap.price_change_24h_pct?),
            Self::FearGreed => positioning::classify_fear_greed(snap.fear_greed?),
            Self::FundingRate => positioning::classify_funding(snap.funding_rate_pct?),
            Self::OiChange => positioning::classify_oi_change(snap.oi_change_pct?, snap.price_change_24h_pct?),
            Self::BasisPremium => positioning::classify_premium(snap.premium_pct?),
        };
        Some(result)
    }

    /// Whether the reading backed a trade in `direction`. Thresholds are
    /// written for LONG; SHORT mirrors them. `None` for HOLD or a missing
    /// value, which counts as neither right nor wrong.
    pub fn supports(self, snap: &IndicatorSnapshot, direction: Direction) -> Option<bool> {
        let long = match direction {
            Direction::Long => true,
            Direction::Short => false,
            Direction::Hold => return None,
        };

        let backed = match self {
            Self::Rsi => mirrored(long, snap.rsi?, 40.0, 60.0),
            Self::StochRsi => mirrored(long, snap.stoch_rsi?, 30.0, 70.0),
            Self::Macd => {
                let (line, hist) = (snap.macd_line?, snap.macd_histogram?);
                if long {
                    line > 0.0 && hist > 0.0
                } else {
                    line < 0.0 && hist < 0.0
                }
            }
            Self::WilliamsR => mirrored(long, snap.williams_r?, -70.0, -30.0),
            Self::Cci => mirrored(long, snap.cci?, -50.0, 50.0),
            Self::Bollinger => mirrored(long, snap.bollinger_position?, 0.3, 0.7),
            Self::ZScore => mirrored(long, snap.z_score?, -1.0, 1.0),
            Self::EmaAlignment => {
                let score = snap.ema_alignment?;
                if long {
                    score >= 60.0
                } else {
                    score <= 40.0
                }
            }
            Self::Ichimoku => {
                let score = snap.ichimoku?;
                if long {
                    score >= 25.0
                } else {
                    score <= -25.0
                }
            }
            Self::Adx => {
                let (strength, plus, minus) = (snap.adx?, snap.plus_di?, snap.minus_di?);
                strength > 20.0 && if long { plus > minus } else { minus > plus }
            }
            Self::Obv => trend_follows(long, snap.obv_delta?, 0.25),
            Self::VolumeRatio => volume_backs(long, snap.volume_ratio?, snap.price_change_pct?),
            Self::HlVolume => volume_backs(long, snap.hl_volume_ratio?, snap.price_change_24h_pct?),
            Self::FearGreed => mirrored(long, snap.fear_greed?, 40.0, 60.0),
            Self::FundingRate => trend_follows(long, snap.funding_rate_pct?, 0.0),
            Self::BasisPremium => trend_follows(long, snap.premium_pct?, 0.0),
            Self::OiChange => {
                let (oi, price) = (snap.oi_change_pct?, snap.price_change_24h_pct?);
                oi > 0.0 && if long { price > 0.0 } else { price < 0.0 }
            }
        };
        Some(backed)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| EngineError::InvalidInput(format!("unknown indicator `{s}`")))
    }
}

/// Oversold-style rule: LONG backed below `low`, SHORT backed above `high`.
fn mirrored(long: bool, value: f64, low: f64, high: f64) -> bool {
    if long {
        value < low
    } else {
        value > high
    }
}

/// Directional rule: LONG backed above `threshold`, SHORT below `-threshold`.
fn trend_follows(long: bool, value: f64, threshold: f64) -> bool {
    if long {
        value > threshold
    } else {
        value < -threshold
    }
}

fn volume_backs(long: bool, ratio: f64, price_change: f64) -> bool {
    ratio > 1.2 && if long { price_change > 0.0 } else { price_change < 0.0 }
}
