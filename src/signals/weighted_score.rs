// =============================================================================
// Weighted Ensemble Scorer — Regime-aware signal aggregation
// =============================================================================
//
// Per indicator:   contribution = weight × strength × sign(signal)
//                  (× the regime's trend / momentum / positioning multiplier)
// Per category:    direction = Σ contributions        (signed)
//                  max       = Σ weights               (unscaled)
//                  score     = min(|direction|, max)
// Total:           score = round(100 × Σ score / Σ max)
//                  bias  = Σ direction + regime bias × Σ max
//
// Decision: LONG / SHORT (sign of bias) when |bias| > 5% of Σ max AND
// score >= 25 × the regime's threshold multiplier; HOLD otherwise.
// A directional call whose risk levels fail the reward : risk validator is
// downgraded to HOLD with a rejection note.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{RiskParams, ScoringParams};
use crate::error::{EngineError, Result};
use crate::indicators::{Category, IndicatorKind, IndicatorSnapshot, PositioningContext};
use crate::regime::{MarketRegime, RegimeProfile, RegimeState};
use crate::risk::{self, RiskLevels};
use crate::signals::weights::IndicatorWeights;
use crate::types::{validate_bars, Bar, Direction, IndicatorResult};

/// The contribution of a single indicator to the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub indicator: IndicatorKind,
    pub category: Category,
    pub weight: f64,
    /// `None` when the reading was unavailable (counted as neutral).
    pub result: Option<IndicatorResult>,
    /// Regime multiplier applied to this indicator's category.
    pub multiplier: f64,
    pub contribution: f64,
}

/// Aggregate of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    /// Signed sum of contributions.
    pub direction: f64,
    /// min(|direction|, max).
    pub score: f64,
    pub max: f64,
}

/// The scorer's call for one coin. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    pub id: Uuid,
    pub coin: String,
    pub direction: Direction,
    /// 0..=100.
    pub score: f64,
    pub bias: f64,
    /// Fraction of categories leaning the same way as the call (diagnostic).
    pub agreement: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub regime: MarketRegime,
    pub regime_confidence: f64,
    pub categories: Vec<CategoryScore>,
    pub contributions: Vec<SignalContribution>,
    pub snapshot: IndicatorSnapshot,
    pub risk: RiskLevels,
    /// Why a directional call was downgraded to HOLD.
    pub rejection: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Collaborator-supplied readings for one scoring call. Either may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketContext<'a> {
    /// Fear & Greed index, 0..=100.
    pub sentiment: Option<i64>,
    pub positioning: Option<&'a PositioningContext>,
}

/// The main weighted scoring engine.
#[derive(Debug, Clone, Default)]
pub struct WeightedScorer {
    pub scoring: ScoringParams,
    pub risk: RiskParams,
}

impl WeightedScorer {
    pub fn new(scoring: ScoringParams, risk: RiskParams) -> Self {
        Self { scoring, risk }
    }

    /// Score `coin` from its bar history.
    ///
    /// Missing weights fall back to the defaults, a missing regime to the
    /// neutral profile. Fails only on empty / invalid bars or an invalid
    /// weight map.
    pub fn score(
        &self,
        bars: &[Bar],
        coin: &str,
        market: MarketContext<'_>,
        weights: Option<&IndicatorWeights>,
        regime: Option<&RegimeState>,
    ) -> Result<SignalOutput> {
        validate_bars(bars)?;
        let entry_price = bars
            .last()
            .map(|b| b.close)
            .ok_or_else(|| EngineError::InvalidInput(format!("no bars to score for {coin}")))?;

        let default_weights;
        let weights = match weights {
            Some(w) => {
                w.validate()?;
                w
            }
            None => {
                default_weights = IndicatorWeights::default();
                &default_weights
            }
        };
        let profile = regime.map(|r| r.profile).unwrap_or(RegimeProfile::NEUTRAL);

        let snapshot = IndicatorSnapshot::compute(bars, market.sentiment, market.positioning);

        // --- Per-indicator contributions -------------------------------------
        let contributions: Vec<SignalContribution> = IndicatorKind::ALL
            .iter()
            .map(|&kind| {
                let weight = weights.get(kind);
                let result = kind.classify(&snapshot);
                let multiplier = category_multiplier(kind.category(), &profile);
                let contribution = result.map_or(0.0, |r| r.contribution(weight) * multiplier);
                SignalContribution {
                    indicator: kind,
                    category: kind.category(),
                    weight,
                    result,
                    multiplier,
                    contribution,
                }
            })
            .collect();

        // --- Category aggregation ----------------------------------------------
        let categories: Vec<CategoryScore> = Category::ALL
            .iter()
            .map(|&category| {
                let (direction, max) = contributions
                    .iter()
                    .filter(|c| c.category == category)
                    .fold((0.0, 0.0), |(d, m), c| (d + c.contribution, m + c.weight));
                CategoryScore {
                    category,
                    direction,
                    score: direction.abs().min(max),
                    max,
                }
            })
            .collect();

        let total_max: f64 = categories.iter().map(|c| c.max).sum();
        let total_score: f64 = categories.iter().map(|c| c.score).sum();
        let score = if total_max > 0.0 {
            (100.0 * total_score / total_max).round()
        } else {
            0.0
        };
        let bias = categories.iter().map(|c| c.direction).sum::<f64>() + profile.direction_bias * total_max;

        // --- Decision ----------------------------------------------------------
        let threshold = self.scoring.base_threshold * profile.score_threshold_multiplier;
        let decisive = bias.abs() > self.scoring.min_bias_fraction * total_max && score >= threshold;
        let lean = if bias >= 0.0 { Direction::Long } else { Direction::Short };
        let mut direction = if decisive { lean } else { Direction::Hold };

        let risk_levels = risk::calculate_levels(bars, entry_price, lean, &self.risk)?;
        let mut rejection = None;
        if direction != Direction::Hold {
            if let Err(note) = risk::validate(&risk_levels, self.risk.min_risk_reward) {
                debug!(coin, direction = %direction, note = %note, "Signal downgraded to HOLD");
                direction = Direction::Hold;
                rejection = Some(note);
            }
        }

        let agreement = agreement(&categories, lean.sign(), self.scoring.agreement_floor);
        let regime_kind = regime.map(|r| r.regime).unwrap_or(MarketRegime::Unknown);

        debug!(
            coin,
            direction = %direction,
            score = format!("{:.0}", score),
            bias = format!("{:.2}", bias),
            threshold = format!("{:.1}", threshold),
            agreement = format!("{:.2}", agreement),
            regime = %regime_kind,
            "Signal scored"
        );

        Ok(SignalOutput {
            id: Uuid::new_v4(),
            coin: coin.to_string(),
            direction,
            score,
            bias,
            agreement,
            entry_price,
            stop_loss: risk_levels.stop_loss,
            take_profit: risk_levels.take_profit,
            risk_reward_ratio: risk_levels.risk_reward_ratio,
            regime: regime_kind,
            regime_confidence: regime.map(|r| r.confidence).unwrap_or(0.0),
            categories,
            contributions,
            snapshot,
            risk: risk_levels,
            rejection,
            timestamp: Utc::now(),
        })
    }
}

fn category_multiplier(category: Category, profile: &RegimeProfile) -> f64 {
    match category {
        Category::Trend => profile.trend_weight_multiplier,
        Category::Momentum => profile.momentum_weight_multiplier,
        Category::Positioning => profile.positioning_weight_multiplier,
        Category::Volume | Category::Sentiment => 1.0,
    }
}

/// Fraction of categories whose direction has the sign `side`, floored.
fn agreement(categories: &[CategoryScore], side: f64, floor: f64) -> f64 {
    if categories.is_empty() {
        return floor;
    }
    let matching = categories
        .iter()
        .filter(|c| c.direction != 0.0 && c.direction.signum() == side)
        .count();
    (matching as f64 / categories.len() as f64).max(floor)
}
