// =============================================================================
// Outcome Tracker — PENDING → WON | LOST, exactly once
// =============================================================================
//
// Every directional signal is recorded PENDING and resolved by live prices.
// Checks, in order, for a LONG (SHORT mirrors):
//
//   1. price >= take profit                          WON   TAKE_PROFIT
//   2. price <= stop loss                            LOST  STOP_LOSS
//   3. gain >= early-exit % and both timeframes
//      confirm momentum reversal                     WON   TARGET_PCT
//   4. older than max hold                           WON if in profit,
//                                                    else LOST   TIMEOUT
//   5. close_manually                                by profit   MANUAL
//
// Terminal records never change again: evaluating or applying a transition
// to a WON / LOST record is a no-op, so repeated delivery of the same price
// observation is harmless.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OutcomeParams;
use crate::exit::reconfirm::DualTimeframeMomentum;
use crate::signals::SignalOutput;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pending,
    Won,
    Lost,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Won => write!(f, "WON"),
            Self::Lost => write!(f, "LOST"),
        }
    }
}

/// The reason a record was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TargetPct,
    Manual,
    Timeout,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
            Self::TargetPct => write!(f, "TARGET_PCT"),
            Self::Manual => write!(f, "MANUAL"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// A scored signal plus its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: SignalOutput,
    pub outcome: Outcome,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub profit_pct: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A single PENDING → terminal move, ready to hand to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub signal_id: Uuid,
    pub coin: String,
    pub outcome: Outcome,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit_pct: f64,
    pub closed_at: DateTime<Utc>,
}

impl SignalRecord {
    pub fn open(signal: SignalOutput) -> Self {
        Self {
            signal,
            outcome: Outcome::Pending,
            exit_price: None,
            exit_reason: None,
            profit_pct: None,
            closed_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.signal.id
    }

    pub fn coin(&self) -> &str {
        &self.signal.coin
    }

    pub fn direction(&self) -> Direction {
        self.signal.direction
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Signed gain (%) of the trade at `price`.
    pub fn profit_pct_at(&self, price: f64) -> f64 {
        let entry = self.signal.entry_price;
        if entry <= 0.0 {
            return 0.0;
        }
        (price - entry) / entry * 100.0 * self.direction().sign()
    }

    /// Decide whether an observed price closes this record. Pure: the record
    /// is not modified.
    pub fn evaluate(
        &self,
        price: f64,
        momentum: Option<&DualTimeframeMomentum>,
        now: DateTime<Utc>,
        params: &OutcomeParams,
    ) -> Option<Transition> {
        if self.is_terminal() || self.direction() == Direction::Hold {
            return None;
        }
        if !price.is_finite() || price <= 0.0 {
            warn!(coin = %self.coin(), price, "Invalid observed price, skipping outcome check");
            return None;
        }

        let long = self.direction() == Direction::Long;
        let sig = &self.signal;
        let profit_pct = self.profit_pct_at(price);

        let hit_tp = if long { price >= sig.take_profit } else { price <= sig.take_profit };
        let hit_sl = if long { price <= sig.stop_loss } else { price >= sig.stop_loss };

        let (outcome, reason) = if hit_tp {
            (Outcome::Won, ExitReason::TakeProfit)
        } else if hit_sl {
            (Outcome::Lost, ExitReason::StopLoss)
        } else if profit_pct >= params.early_exit_pct
            && momentum.is_some_and(|m| m.confirms_exit(self.direction()))
        {
            (Outcome::Won, ExitReason::TargetPct)
        } else if now - sig.timestamp >= Duration::hours(params.max_hold_hours) {
            (by_profit(profit_pct), ExitReason::Timeout)
        } else {
            if profit_pct >= params.early_exit_pct {
                debug!(
                    coin = %self.coin(),
                    profit_pct = format!("{:.2}", profit_pct),
                    "Early-exit threshold reached without dual-timeframe reversal, holding"
                );
            }
            return None;
        };

        Some(self.transition(outcome, reason, price, profit_pct, now))
    }

    /// Close at `price` on the caller's request.
    pub fn close_manually(&self, price: f64, now: DateTime<Utc>) -> Option<Transition> {
        if self.is_terminal() || !price.is_finite() || price <= 0.0 {
            return None;
        }
        let profit_pct = self.profit_pct_at(price);
        Some(self.transition(by_profit(profit_pct), ExitReason::Manual, price, profit_pct, now))
    }

    /// Apply a transition. Returns false (and changes nothing) when the
    /// record is already terminal or the transition belongs to another record.
    pub fn apply(&mut self, t: &Transition) -> bool {
        if self.is_terminal() || t.signal_id != self.id() || !t.outcome.is_terminal() {
            return false;
        }
        self.outcome = t.outcome;
        self.exit_price = Some(t.exit_price);
        self.exit_reason = Some(t.exit_reason);
        self.profit_pct = Some(t.profit_pct);
        self.closed_at = Some(t.closed_at);
        true
    }

    fn transition(
        &self,
        outcome: Outcome,
        exit_reason: ExitReason,
        exit_price: f64,
        profit_pct: f64,
        closed_at: DateTime<Utc>,
    ) -> Transition {
        Transition {
            signal_id: self.id(),
            coin: self.coin().to_string(),
            outcome,
            exit_price,
            exit_reason,
            profit_pct,
            closed_at,
        }
    }
}

fn by_profit(profit_pct: f64) -> Outcome {
    if profit_pct > 0.0 {
        Outcome::Won
    } else {
        Outcome::Lost
    }
}

/// Evaluate every open record against the latest prices.
///
/// Records without a price, or already terminal, are skipped. `momentum`
/// holds pre-fetched dual-timeframe readings per coin.
pub fn check_outcomes(
    records: &[SignalRecord],
    prices: &HashMap<String, f64>,
    momentum: &HashMap<String, DualTimeframeMomentum>,
    now: DateTime<Utc>,
    params: &OutcomeParams,
) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for record in records {
        let Some(&price) = prices.get(record.coin()) else {
            continue;
        };
        if let Some(t) = record.evaluate(price, momentum.get(record.coin()), now, params) {
            info!(
                coin = %t.coin,
                id = %t.signal_id,
                outcome = %t.outcome,
                reason = %t.exit_reason,
                exit_price = t.exit_price,
                profit_pct = format!("{:.2}", t.profit_pct),
                "Signal closed"
            );
            transitions.push(t);
        }
    }
    transitions
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::reconfirm::MomentumReading;
    use crate::indicators::IndicatorSnapshot;
    use crate::regime::MarketRegime;
    use crate::risk::RiskLevels;

    fn signal(direction: Direction, entry: f64, sl: f64, tp: f64) -> SignalOutput {
        SignalOutput {
            id: Uuid::new_v4(),
            coin: "BTC".to_string(),
            direction,
            score: 60.0,
            bias: 20.0,
            agreement: 0.8,
            entry_price: entry,
            stop_loss: sl,
            take_profit: tp,
            risk_reward_ratio: ((tp - entry) / (entry - sl)).abs(),
            regime: MarketRegime::Unknown,
            regime_confidence: 0.0,
            categories: Vec::new(),
            contributions: Vec::new(),
            snapshot: IndicatorSnapshot::default(),
            risk: RiskLevels {
                entry_price: entry,
                stop_loss: sl,
                take_profit: tp,
                risk_reward_ratio: 2.0,
                atr: 1.0,
                atr_fallback: false,
                stop_structure: None,
                target_structure: None,
            },
            rejection: None,
            timestamp: Utc::now(),
        }
    }

    fn long_record() -> SignalRecord {
        SignalRecord::open(signal(Direction::Long, 100.0, 95.0, 110.0))
    }

    fn reversal() -> DualTimeframeMomentum {
        let turned = MomentumReading {
            rsi: Some(40.0),
            macd_histogram: Some(-0.5),
        };
        DualTimeframeMomentum::new(turned, turned)
    }

    #[test]
    fn take_profit_wins() {
        let t = long_record().evaluate(111.0, None, Utc::now(), &OutcomeParams::default()).unwrap();
        assert_eq!(t.outcome, Outcome::Won);
        assert_eq!(t.exit_reason, ExitReason::TakeProfit);
        assert!((t.profit_pct - 11.0).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_loses() {
        let t = long_record().evaluate(94.0, None, Utc::now(), &OutcomeParams::default()).unwrap();
        assert_eq!(t.outcome, Outcome::Lost);
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn short_is_mirrored() {
        let rec = SignalRecord::open(signal(Direction::Short, 100.0, 105.0, 90.0));
        let params = OutcomeParams::default();
        assert_eq!(rec.evaluate(89.0, None, Utc::now(), &params).unwrap().exit_reason, ExitReason::TakeProfit);
        assert_eq!(rec.evaluate(106.0, None, Utc::now(), &params).unwrap().outcome, Outcome::Lost);
        assert!(rec.evaluate(99.0, None, Utc::now(), &params).is_none());
    }

    #[test]
    fn early_exit_needs_both_timeframes() {
        let rec = long_record();
        let params = OutcomeParams::default();
        // +4% without re-confirmation keeps running.
        assert!(rec.evaluate(104.0, None, Utc::now(), &params).is_none());

        let half = DualTimeframeMomentum::new(
            reversal().fast,
            MomentumReading {
                rsi: Some(65.0),
                macd_histogram: Some(0.2),
            },
        );
        assert!(rec.evaluate(104.0, Some(&half), Utc::now(), &params).is_none());

        let t = rec.evaluate(104.0, Some(&reversal()), Utc::now(), &params).unwrap();
        assert_eq!(t.outcome, Outcome::Won);
        assert_eq!(t.exit_reason, ExitReason::TargetPct);

        // Below the threshold a confirmed reversal does nothing.
        assert!(rec.evaluate(102.0, Some(&reversal()), Utc::now(), &params).is_none());
    }

    #[test]
    fn timeout_closes_by_profit() {
        let rec = long_record();
        let later = rec.signal.timestamp + Duration::hours(73);
        let params = OutcomeParams::default();
        let up = rec.evaluate(101.0, None, later, &params).unwrap();
        assert_eq!((up.outcome, up.exit_reason), (Outcome::Won, ExitReason::Timeout));
        let down = rec.evaluate(99.0, None, later, &params).unwrap();
        assert_eq!(down.outcome, Outcome::Lost);
    }

    #[test]
    fn terminal_record_is_idempotent() {
        let mut rec = long_record();
        let params = OutcomeParams::default();
        let t = rec.evaluate(94.0, None, Utc::now(), &params).unwrap();
        assert!(rec.apply(&t));
        let closed = rec.clone();

        // Same observation again, and a conflicting one.
        assert!(rec.evaluate(94.0, None, Utc::now(), &params).is_none());
        assert!(rec.evaluate(120.0, None, Utc::now(), &params).is_none());
        assert!(!rec.apply(&t));
        assert!(rec.close_manually(120.0, Utc::now()).is_none());
        assert_eq!(rec, closed);
    }

    #[test]
    fn invalid_price_is_ignored() {
        let rec = long_record();
        let params = OutcomeParams::default();
        assert!(rec.evaluate(0.0, None, Utc::now(), &params).is_none());
        assert!(rec.evaluate(-5.0, None, Utc::now(), &params).is_none());
        assert!(rec.evaluate(f64::NAN, None, Utc::now(), &params).is_none());
    }

    #[test]
    fn manual_close() {
        let rec = long_record();
        let t = rec.close_manually(97.0, Utc::now()).unwrap();
        assert_eq!((t.outcome, t.exit_reason), (Outcome::Lost, ExitReason::Manual));
    }

    #[test]
    fn check_outcomes_skips_unpriced_and_closed() {
        let open = long_record();
        let mut closed = long_record();
        let t = closed.evaluate(120.0, None, Utc::now(), &OutcomeParams::default()).unwrap();
        closed.apply(&t);
        let mut eth = SignalRecord::open(signal(Direction::Long, 10.0, 9.0, 12.0));
        eth.signal.coin = "ETH".to_string();

        let prices = HashMap::from([("BTC".to_string(), 111.0)]);
        let transitions = check_outcomes(
            &[open.clone(), closed, eth],
            &prices,
            &HashMap::new(),
            Utc::now(),
            &OutcomeParams::default(),
        );
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].signal_id, open.id());
    }
}
