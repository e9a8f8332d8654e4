// =============================================================================
// Market Regime Classifier
// =============================================================================
//
// Classifies the market as a whole from four independent dimensions:
//
//   trend        reference asset EMA stack + ADX      (UP / DOWN / FLAT)
//   volatility   reference ATR as % of price          (LOW / NORMAL / HIGH / EXTREME)
//   breadth      average change across peer assets (%)
//   positioning  average funding rate (%) and OI change (%)
//
// Each regime lists four checks, one per dimension, plus a gate that must
// hold. The first regime (in the order below) whose gate holds and with at
// least three agreeing checks wins; confidence = agreeing checks / 4.
//
//   1. RECOVERY_PUMP  gate: reference +5% in a day while the trend is not UP
//   2. DISTRIBUTION   gate: crowded longs (funding >= 0.05%)
//   3. BULL_TREND     gate: trend UP
//   4. BEAR_TREND     gate: trend DOWN
//   5. HIGH_VOL_CHOP  gate: no trend and HIGH / EXTREME volatility
//   6. ACCUMULATION   gate: trend not UP and LOW / NORMAL volatility
//   7. UNKNOWN        fewer than 20 bars, or no regime qualifies
//
// Each regime carries scoring multipliers. UNKNOWN is neutral everywhere.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::indicators::adx::calculate_adx;
use crate::indicators::atr::calculate_atr_pct;
use crate::indicators::ema::calculate_ema;
use crate::indicators::roc::recent_change_pct;
use crate::types::Bar;

/// Below this many reference bars the regime is UNKNOWN.
pub const MIN_BARS: usize = 20;

const AGREEMENT_NEEDED: usize = 3;
const PUMP_CHANGE_PCT: f64 = 5.0;
const CROWDED_FUNDING_PCT: f64 = 0.05;
const OI_BUILD_PCT: f64 = 3.0;
const TREND_ADX: f64 = 20.0;
/// Bars spanning one day at the default 1h interval.
pub const DAY_BARS: usize = 24;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    BullTrend,
    BearTrend,
    HighVolChop,
    RecoveryPump,
    Distribution,
    Accumulation,
    Unknown,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BullTrend => write!(f, "BULL_TREND"),
            Self::BearTrend => write!(f, "BEAR_TREND"),
            Self::HighVolChop => write!(f, "HIGH_VOL_CHOP"),
            Self::RecoveryPump => write!(f, "RECOVERY_PUMP"),
            Self::Distribution => write!(f, "DISTRIBUTION"),
            Self::Accumulation => write!(f, "ACCUMULATION"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityLevel {
    /// Grade ATR as a percentage of price.
    pub fn from_atr_pct(atr_pct: f64) -> Self {
        if atr_pct < 1.5 {
            Self::Low
        } else if atr_pct < 3.5 {
            Self::Normal
        } else if atr_pct < 6.0 {
            Self::High
        } else {
            Self::Extreme
        }
    }

    fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Extreme)
    }
}

/// Scoring multipliers a regime applies. All multipliers are > 0;
/// `direction_bias` is a signed fraction of the theoretical maximum score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeProfile {
    pub score_threshold_multiplier: f64,
    pub trend_weight_multiplier: f64,
    pub momentum_weight_multiplier: f64,
    pub positioning_weight_multiplier: f64,
    pub direction_bias: f64,
}

impl RegimeProfile {
    pub const NEUTRAL: RegimeProfile = RegimeProfile {
        score_threshold_multiplier: 1.0,
        trend_weight_multiplier: 1.0,
        momentum_weight_multiplier: 1.0,
        positioning_weight_multiplier: 1.0,
        direction_bias: 0.0,
    };
}

impl MarketRegime {
    /// Decision matrix: per-regime scoring multipliers.
    pub fn profile(self) -> RegimeProfile {
        let p = |threshold, trend, momentum, positioning, bias| RegimeProfile {
            score_threshold_multiplier: threshold,
            trend_weight_multiplier: trend,
            momentum_weight_multiplier: momentum,
            positioning_weight_multiplier: positioning,
            direction_bias: bias,
        };
        match self {
            // Trends: easier entries, lean on trend readings.
            Self::BullTrend => p(0.9, 1.2, 1.0, 0.9, 0.05),
            Self::BearTrend => p(0.9, 1.2, 1.0, 0.9, -0.05),
            // Chop: demand more, trust oscillators over trend lines.
            Self::HighVolChop => p(1.3, 0.7, 1.2, 1.0, 0.0),
            Self::RecoveryPump => p(1.0, 0.8, 1.2, 1.2, 0.03),
            // Turning points are read from the crowd.
            Self::Distribution => p(1.1, 0.9, 1.0, 1.3, 0.0),
            Self::Accumulation => p(1.1, 0.9, 1.0, 1.3, 0.0),
            Self::Unknown => RegimeProfile::NEUTRAL,
        }
    }
}

/// The four regime dimensions, measured once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeContext {
    /// Reference bars available; below `MIN_BARS` nothing else is trusted.
    pub bars: usize,
    pub trend: TrendDirection,
    /// ADX of the reference asset.
    pub trend_strength: f64,
    pub volatility: VolatilityLevel,
    pub atr_pct: f64,
    /// Reference asset change over the last day of bars (%).
    pub reference_change_pct: f64,
    /// Average peer change (%); falls back to the reference change.
    pub breadth_pct: f64,
    pub avg_funding_pct: Option<f64>,
    pub avg_oi_change_pct: Option<f64>,
}

impl RegimeContext {
    /// Build the context from the reference asset's bars and peer readings.
    ///
    /// `peer_changes_pct`, `fundings_pct` and `oi_changes_pct` may be empty;
    /// non-finite entries are ignored.
    pub fn from_market(
        reference_bars: &[Bar],
        peer_changes_pct: &[f64],
        fundings_pct: &[f64],
        oi_changes_pct: &[f64],
    ) -> Self {
        let closes: Vec<f64> = reference_bars.iter().map(|b| b.close).collect();

        // EMA 21/50 once there is room for it; shorter history uses 9/21.
        let (fast, slow) = if closes.len() > 50 { (21, 50) } else { (9, 21) };
        let ema_fast = calculate_ema(&closes, fast).last().copied();
        let ema_slow = calculate_ema(&closes, slow).last().copied();
        let adx = calculate_adx(reference_bars, 14).map(|r| r.adx).unwrap_or(0.0);
        let close = closes.last().copied().unwrap_or(0.0);

        let trend = match (ema_fast, ema_slow) {
            (Some(f), Some(s)) if adx >= TREND_ADX && f > s && close > f => TrendDirection::Up,
            (Some(f), Some(s)) if adx >= TREND_ADX && f < s && close < f => TrendDirection::Down,
            _ => TrendDirection::Flat,
        };

        let atr_pct = calculate_atr_pct(reference_bars, 14).unwrap_or(0.0);
        let reference_change_pct = recent_change_pct(&closes, DAY_BARS).unwrap_or(0.0);

        Self {
            bars: reference_bars.len(),
            trend,
            trend_strength: adx,
            volatility: VolatilityLevel::from_atr_pct(atr_pct),
            atr_pct,
            reference_change_pct,
            breadth_pct: mean(peer_changes_pct).unwrap_or(reference_change_pct),
            avg_funding_pct: mean(fundings_pct),
            avg_oi_change_pct: mean(oi_changes_pct),
        }
    }
}

/// Complete snapshot of the detected regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    /// Fraction of the regime's four checks that agreed, in [0, 1].
    pub confidence: f64,
    pub profile: RegimeProfile,
    pub context: RegimeContext,
    /// When this regime was first detected in an unbroken run.
    pub since: DateTime<Utc>,
}

impl RegimeState {
    /// Neutral state used when no market context is available.
    pub fn unknown() -> Self {
        Self {
            regime: MarketRegime::Unknown,
            confidence: 0.0,
            profile: RegimeProfile::NEUTRAL,
            context: RegimeContext {
                bars: 0,
                trend: TrendDirection::Flat,
                trend_strength: 0.0,
                volatility: VolatilityLevel::Normal,
                atr_pct: 0.0,
                reference_change_pct: 0.0,
                breadth_pct: 0.0,
                avg_funding_pct: None,
                avg_oi_change_pct: None,
            },
            since: Utc::now(),
        }
    }
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Caches the latest regime so the runner can report how long it has held.
pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
}

impl RegimeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Classify `ctx` and remember the result.
    pub fn update(&self, ctx: RegimeContext) -> RegimeState {
        let (regime, confidence) = classify(&ctx);
        let now = Utc::now();

        let since = match self.state.read().as_ref() {
            Some(prev) if prev.regime == regime => prev.since,
            _ => now,
        };

        debug!(
            regime = %regime,
            confidence = format!("{:.2}", confidence),
            trend = ?ctx.trend,
            adx = format!("{:.2}", ctx.trend_strength),
            volatility = ?ctx.volatility,
            breadth = format!("{:.2}", ctx.breadth_pct),
            age_secs = (now - since).num_seconds(),
            "Regime detected"
        );

        let state = RegimeState {
            regime,
            confidence,
            profile: regime.profile(),
            context: ctx,
            since,
        };
        *self.state.write() = Some(state.clone());
        state
    }

    /// Most recently detected regime without recomputing.
    pub fn current(&self) -> Option<RegimeState> {
        self.state.read().clone()
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }
}

// =============================================================================
// Classification logic
// =============================================================================

/// Determine the regime and its confidence from the context.
pub fn classify(ctx: &RegimeContext) -> (MarketRegime, f64) {
    if ctx.bars < MIN_BARS {
        trace!(bars = ctx.bars, "Regime: insufficient history, UNKNOWN");
        return (MarketRegime::Unknown, 0.0);
    }

    let funding = ctx.avg_funding_pct;
    let oi = ctx.avg_oi_change_pct;
    let trend_up = ctx.trend == TrendDirection::Up;
    let trend_down = ctx.trend == TrendDirection::Down;
    let flat = ctx.trend == TrendDirection::Flat;

    let candidates: [(MarketRegime, bool, [bool; 4]); 6] = [
        (
            MarketRegime::RecoveryPump,
            ctx.reference_change_pct >= PUMP_CHANGE_PCT && !trend_up,
            [
                !trend_up,
                ctx.volatility.is_elevated(),
                ctx.breadth_pct >= 3.0,
                funding.is_some_and(|f| f <= 0.0),
            ],
        ),
        (
            MarketRegime::Distribution,
            funding.is_some_and(|f| f >= CROWDED_FUNDING_PCT),
            [
                !trend_down,
                ctx.breadth_pct <= 0.0,
                funding.is_some_and(|f| f >= CROWDED_FUNDING_PCT),
                oi.is_some_and(|o| o >= OI_BUILD_PCT),
            ],
        ),
        (
            MarketRegime::BullTrend,
            trend_up,
            [
                trend_up,
                ctx.volatility != VolatilityLevel::Extreme,
                ctx.breadth_pct > 0.0,
                funding.is_some_and(|f| f < CROWDED_FUNDING_PCT),
            ],
        ),
        (
            MarketRegime::BearTrend,
            trend_down,
            [
                trend_down,
                ctx.volatility != VolatilityLevel::Extreme,
                ctx.breadth_pct < 0.0,
                funding.is_some_and(|f| f > -CROWDED_FUNDING_PCT),
            ],
        ),
        (
            MarketRegime::HighVolChop,
            flat && ctx.volatility.is_elevated(),
            [
                flat,
                ctx.volatility.is_elevated(),
                ctx.breadth_pct.abs() < 2.0,
                ctx.reference_change_pct.abs() < 3.0,
            ],
        ),
        (
            MarketRegime::Accumulation,
            !trend_up && !ctx.volatility.is_elevated(),
            [
                !trend_up,
                !ctx.volatility.is_elevated(),
                funding.is_some_and(|f| f <= 0.0),
                oi.is_some_and(|o| o >= OI_BUILD_PCT),
            ],
        ),
    ];

    for (regime, gate, checks) in candidates {
        let agreeing = checks.iter().filter(|&&c| c).count();
        if gate && agreeing >= AGREEMENT_NEEDED {
            return (regime, agreeing as f64 / checks.len() as f64);
        }
    }

    trace!(
        trend = ?ctx.trend,
        volatility = ?ctx.volatility,
        breadth = format!("{:.2}", ctx.breadth_pct),
        "Regime: no rule matched, UNKNOWN"
    );
    (MarketRegime::Unknown, 0.0)
}

fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}
