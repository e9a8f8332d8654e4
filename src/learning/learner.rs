// =============================================================================
// Weight Learner — streak-driven weight adjustment with recovery
// =============================================================================
//
// Three independent paths feed closed outcomes back into the indicator
// weights:
//
//   Loss path   earliest unprocessed run of >= 3 LOST. Over the last 20 LOST
//               records up to the run's end, an indicator that backed the
//               losing side ("confidently wrong") in >= 50% of them is cut
//               by min(15%, ratio x 15%), floored at the minimum weight.
//   Win path    mirror over WON records: backed the winning side in >= 60%
//               of them, boost by min(10%, ratio x 10%), capped at maximum.
//   Recovery    an indicator below its default with no wrong call in the
//               last 20 closed trades closes 5% of the gap per call.
//
// After any path fires the full vector is renormalised (sum 100, each weight
// in [1, 20]) and committed together with the advanced streak cursor and the
// LearningCycle audit record, in one store write under the version token.
// A recovery whose renormalised result moves no weight by more than the
// materiality floor is not committed.
//
// Learning cycles are serialised through `cycle_lock`; the version token
// additionally rejects a commit from any other process that raced us.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LearningParams;
use crate::error::{EngineError, Result};
use crate::exit::{Outcome, SignalRecord};
use crate::indicators::IndicatorKind;
use crate::learning::streak::{scan_for_streak, ScanResult, Streak};
use crate::signals::IndicatorWeights;
use crate::store::{RecordStore, StreakCursors, WeightState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    ConsecutiveLosses,
    ConsecutiveWins,
    Manual,
    Recovery,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConsecutiveLosses => "consecutive_losses",
            Self::ConsecutiveWins => "consecutive_wins",
            Self::Manual => "manual",
            Self::Recovery => "recovery",
        };
        f.write_str(s)
    }
}

/// Which side of the closed history a streak cycle learns from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningDirection {
    Loss,
    Win,
}

impl LearningDirection {
    pub fn outcome(self) -> Outcome {
        match self {
            Self::Loss => Outcome::Lost,
            Self::Win => Outcome::Won,
        }
    }

    fn triggered_by(self) -> TriggeredBy {
        match self {
            Self::Loss => TriggeredBy::ConsecutiveLosses,
            Self::Win => TriggeredBy::ConsecutiveWins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAdjustment {
    pub indicator: IndicatorKind,
    pub old_weight: f64,
    pub new_weight: f64,
    pub change_percent: f64,
    pub reason: String,
}

impl WeightAdjustment {
    fn new(indicator: IndicatorKind, old_weight: f64, new_weight: f64, reason: String) -> Self {
        let change_percent = if old_weight > 0.0 {
            (new_weight - old_weight) / old_weight * 100.0
        } else {
            0.0
        };
        Self {
            indicator,
            old_weight,
            new_weight,
            change_percent,
            reason,
        }
    }
}

/// Immutable audit record of one learning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCycle {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub triggered_by: TriggeredBy,
    pub signals_analyzed: usize,
    #[serde(default)]
    pub streak: Option<Streak>,
    pub adjustments: Vec<WeightAdjustment>,
    /// Full weight vector after renormalisation.
    pub weights_snapshot: IndicatorWeights,
}

/// Budgeted scans one `run_learning_cycle` call may chain before it defers
/// the rest of the history to the next call.
const MAX_SCAN_ROUNDS: usize = 64;

/// Result of one streak-scan step.
enum Step {
    Cycle(LearningCycle),
    /// Scan budget spent; cursor moved forward, scan again.
    Advanced,
    Exhausted,
}

// =============================================================================
// Window analysis (pure)
// =============================================================================

/// Per-indicator adjustments for one analysis window. `window` holds records
/// of a single outcome; the rule direction follows `direction`.
pub fn analyse_window(
    weights: &IndicatorWeights,
    window: &[&SignalRecord],
    direction: LearningDirection,
    params: &LearningParams,
) -> Vec<WeightAdjustment> {
    if window.is_empty() {
        return Vec::new();
    }
    let n = window.len() as f64;

    let mut adjustments = Vec::new();
    for kind in IndicatorKind::ALL {
        let hits = window
            .iter()
            .filter(|r| kind.supports(&r.signal.snapshot, r.direction()) == Some(true))
            .count();
        let ratio = hits as f64 / n;
        let old = weights.get(kind);

        let (new, reason) = match direction {
            LearningDirection::Loss => {
                if ratio < params.loss_ratio_threshold {
                    continue;
                }
                let cut = (ratio * params.loss_max_adjust).min(params.loss_max_adjust);
                (
                    (old * (1.0 - cut)).max(params.min_weight),
                    format!("wrong in {hits}/{} losses", window.len()),
                )
            }
            LearningDirection::Win => {
                if ratio < params.win_ratio_threshold {
                    continue;
                }
                let boost = (ratio * params.win_max_adjust).min(params.win_max_adjust);
                (
                    (old * (1.0 + boost)).min(params.max_weight),
                    format!("correct in {hits}/{} wins", window.len()),
                )
            }
        };

        if (new - old).abs() <= params.materiality_floor {
            debug!(indicator = %kind, old, new, "Adjustment below materiality floor, skipped");
            continue;
        }
        adjustments.push(WeightAdjustment::new(kind, old, new, reason));
    }
    adjustments
}

/// The last `limit` records with `outcome`, oldest first.
fn recent_with_outcome(records: &[SignalRecord], outcome: Outcome, limit: usize) -> Vec<&SignalRecord> {
    let mut window: Vec<&SignalRecord> = records.iter().rev().filter(|r| r.outcome == outcome).take(limit).collect();
    window.reverse();
    window
}

/// Per-indicator recovery steps toward the default weight.
pub fn recovery_adjustments(
    weights: &IndicatorWeights,
    closed: &[SignalRecord],
    params: &LearningParams,
) -> Vec<WeightAdjustment> {
    let mut adjustments = Vec::new();
    for kind in IndicatorKind::ALL {
        let default = kind.default_weight();
        let old = weights.get(kind);
        let gap = default - old;
        if gap <= params.materiality_floor {
            continue;
        }

        let last_wrong = closed
            .iter()
            .rposition(|r| r.outcome == Outcome::Lost && kind.supports(&r.signal.snapshot, r.direction()) == Some(true));
        let clean_trades = match last_wrong {
            Some(idx) => closed.len() - idx - 1,
            None => closed.len(),
        };
        if clean_trades < params.recovery_after_trades {
            continue;
        }

        // An immaterial step, or a remainder under the floor, closes the gap.
        let step = gap * params.recovery_rate;
        let new = if step <= params.materiality_floor || gap - step <= params.materiality_floor {
            default
        } else {
            old + step
        };
        adjustments.push(WeightAdjustment::new(
            kind,
            old,
            new,
            format!("no wrong call in last {clean_trades} trades"),
        ));
    }
    adjustments
}

// =============================================================================
// Learner
// =============================================================================

pub struct WeightLearner<S: RecordStore + ?Sized> {
    store: Arc<S>,
    params: LearningParams,
    cycle_lock: Mutex<()>,
}

impl<S: RecordStore + ?Sized> WeightLearner<S> {
    pub fn new(store: Arc<S>, params: LearningParams) -> Self {
        Self {
            store,
            params,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn params(&self) -> &LearningParams {
        &self.params
    }

    /// Stored weight state, or factory defaults at version 0.
    pub fn weight_state(&self) -> Result<WeightState> {
        Ok(self.store.load_weight_state()?.unwrap_or_default())
    }

    pub fn current_weights(&self) -> Result<IndicatorWeights> {
        Ok(self.weight_state()?.weights)
    }

    /// Process the earliest unprocessed streak in `direction`. `None` when
    /// no qualifying streak remains.
    pub fn run_learning_cycle(&self, direction: LearningDirection) -> Result<Option<LearningCycle>> {
        let _guard = self.cycle_lock.lock();
        for _ in 0..MAX_SCAN_ROUNDS {
            match self.streak_step(direction)? {
                Step::Cycle(cycle) => return Ok(Some(cycle)),
                Step::Advanced => continue,
                Step::Exhausted => return Ok(None),
            }
        }
        debug!(direction = ?direction, rounds = MAX_SCAN_ROUNDS, "Scan rounds spent, rest deferred to the next call");
        Ok(None)
    }

    /// Loss cycles, then win cycles, until no streak remains or the
    /// per-run cap is hit.
    pub fn run_pending_cycles(&self) -> Result<Vec<LearningCycle>> {
        let mut cycles = Vec::new();
        for direction in [LearningDirection::Loss, LearningDirection::Win] {
            while cycles.len() < self.params.max_cycles_per_run {
                match self.run_learning_cycle(direction)? {
                    Some(cycle) => cycles.push(cycle),
                    None => break,
                }
            }
        }
        if cycles.len() >= self.params.max_cycles_per_run {
            warn!(cap = self.params.max_cycles_per_run, "Learning cycle cap reached, remaining streaks deferred");
        }
        Ok(cycles)
    }

    /// Analyse the latest windows of losses and wins without touching the
    /// streak cursors. `None` when there is no closed history.
    pub fn run_manual_cycle(&self) -> Result<Option<LearningCycle>> {
        let _guard = self.cycle_lock.lock();
        let state = self.weight_state()?;
        let closed = self.store.list_closed_signals()?;
        if closed.is_empty() {
            return Ok(None);
        }

        let losses = recent_with_outcome(&closed, Outcome::Lost, self.params.analysis_window);
        let wins = recent_with_outcome(&closed, Outcome::Won, self.params.analysis_window);

        let mut weights = state.weights.clone();
        let mut adjustments = analyse_window(&weights, &losses, LearningDirection::Loss, &self.params);
        apply(&mut weights, &adjustments);
        let boosts = analyse_window(&weights, &wins, LearningDirection::Win, &self.params);
        apply(&mut weights, &boosts);
        adjustments.extend(boosts);

        let cycle = self.commit_cycle(
            &state,
            weights,
            state.cursors,
            TriggeredBy::Manual,
            losses.len() + wins.len(),
            None,
            adjustments,
        )?;
        Ok(Some(cycle))
    }

    /// Move stale-penalised weights toward their defaults. Empty when nothing
    /// qualified; nothing is committed in that case.
    pub fn recover_weights(&self) -> Result<Vec<WeightAdjustment>> {
        let _guard = self.cycle_lock.lock();
        let state = self.weight_state()?;
        let closed = self.store.list_closed_signals()?;

        let adjustments = recovery_adjustments(&state.weights, &closed, &self.params);
        if adjustments.is_empty() {
            return Ok(adjustments);
        }

        let mut weights = state.weights.clone();
        apply(&mut weights, &adjustments);
        weights.renormalize(self.params.min_weight, self.params.max_weight);
        let moved = IndicatorKind::ALL
            .iter()
            .map(|&k| (weights.get(k) - state.weights.get(k)).abs())
            .fold(0.0, f64::max);
        if moved <= self.params.materiality_floor {
            debug!(moved, "Recovery immaterial after renormalisation, nothing committed");
            return Ok(Vec::new());
        }

        let cycle = self.commit_cycle(
            &state,
            weights,
            state.cursors,
            TriggeredBy::Recovery,
            closed.len(),
            None,
            adjustments,
        )?;
        Ok(cycle.adjustments)
    }

    fn streak_step(&self, direction: LearningDirection) -> Result<Step> {
        let state = self.weight_state()?;
        let closed = self.store.list_closed_signals()?;
        let outcome = direction.outcome();

        let cursor = match direction {
            LearningDirection::Loss => state.cursors.loss,
            LearningDirection::Win => state.cursors.win,
        };
        if cursor > closed.len() {
            warn!(
                cursor,
                closed = closed.len(),
                direction = ?direction,
                "Streak cursor beyond closed history, nothing to scan"
            );
            return Ok(Step::Exhausted);
        }

        let streak = match scan_for_streak(&closed, outcome, cursor, self.params.streak_length, self.params.max_scan) {
            ScanResult::Found(streak) => streak,
            ScanResult::Exhausted => return Ok(Step::Exhausted),
            ScanResult::CapReached { resume_at } => {
                debug!(direction = ?direction, resume_at, "Streak scan budget spent, advancing cursor");
                let mut next = state.clone();
                set_cursor(&mut next, direction, resume_at);
                warn_on_conflict(self.store.commit_weight_state(state.version, next))?;
                return Ok(Step::Advanced);
            }
        };

        let window = recent_with_outcome(&closed[..=streak.end], outcome, self.params.analysis_window);
        let adjustments = analyse_window(&state.weights, &window, direction, &self.params);

        let mut weights = state.weights.clone();
        apply(&mut weights, &adjustments);

        let mut cursors = state.cursors;
        match direction {
            LearningDirection::Loss => cursors.loss = streak.end + 1,
            LearningDirection::Win => cursors.win = streak.end + 1,
        }

        let cycle = self.commit_cycle(
            &state,
            weights,
            cursors,
            direction.triggered_by(),
            window.len(),
            Some(streak),
            adjustments,
        )?;
        Ok(Step::Cycle(cycle))
    }

    /// Renormalise, then commit weights, cursors and the audit record as one
    /// store write.
    #[allow(clippy::too_many_arguments)]
    fn commit_cycle(
        &self,
        base: &WeightState,
        mut weights: IndicatorWeights,
        cursors: StreakCursors,
        triggered_by: TriggeredBy,
        signals_analyzed: usize,
        streak: Option<Streak>,
        adjustments: Vec<WeightAdjustment>,
    ) -> Result<LearningCycle> {
        weights.renormalize(self.params.min_weight, self.params.max_weight);

        let cycle = LearningCycle {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            triggered_by,
            signals_analyzed,
            streak,
            adjustments,
            weights_snapshot: weights.clone(),
        };
        let next = WeightState {
            weights,
            cursors,
            version: base.version,
            updated_at: base.updated_at,
        };
        let committed = warn_on_conflict(self.store.commit_learning_cycle(base.version, next, cycle.clone()))?;

        info!(
            triggered_by = %cycle.triggered_by,
            signals_analyzed = cycle.signals_analyzed,
            adjustments = cycle.adjustments.len(),
            streak_len = cycle.streak.as_ref().map_or(0, |s| s.count),
            version = committed.version,
            "Learning cycle committed"
        );
        for adj in &cycle.adjustments {
            info!(
                indicator = %adj.indicator,
                old = format!("{:.3}", adj.old_weight),
                new = format!("{:.3}", adj.new_weight),
                change_pct = format!("{:+.2}", adj.change_percent),
                reason = %adj.reason,
                "Weight adjusted"
            );
        }
        Ok(cycle)
    }
}

fn warn_on_conflict(result: Result<WeightState>) -> Result<WeightState> {
    if let Err(EngineError::ConcurrentModification { expected, found }) = &result {
        warn!(expected, found, "Weight state changed by another writer, cycle discarded");
    }
    result
}

fn apply(weights: &mut IndicatorWeights, adjustments: &[WeightAdjustment]) {
    for adj in adjustments {
        weights.set(adj.indicator, adj.new_weight);
    }
}

fn set_cursor(state: &mut WeightState, direction: LearningDirection, at: usize) {
    match direction {
        LearningDirection::Loss => state.cursors.loss = at,
        LearningDirection::Win => state.cursors.win = at,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::indicators::IndicatorSnapshot;
    use crate::store::memory::tests::closed_record;
    use crate::store::MemoryStore;
    use crate::types::Direction;

    const MIN: f64 = 1.0;
    const MAX: f64 = 20.0;

    fn assert_invariants(weights: &IndicatorWeights) {
        assert!(
            weights.is_normalized(MIN, MAX, 0.1),
            "weights out of bounds: {:?}",
            weights.to_named()
        );
    }

    fn rsi_macd_wrong_for_long() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: Some(25.0),
            macd_line: Some(0.8),
            macd_histogram: Some(0.3),
            ..IndicatorSnapshot::default()
        }
    }

    fn adx_up() -> IndicatorSnapshot {
        IndicatorSnapshot {
            adx: Some(30.0),
            plus_di: Some(25.0),
            minus_di: Some(15.0),
            ..IndicatorSnapshot::default()
        }
    }

    /// Closed LONG records, one minute apart, from `(outcome, snapshot)`.
    fn history(entries: Vec<(Outcome, IndicatorSnapshot)>) -> Vec<SignalRecord> {
        let base = Utc::now() - Duration::days(1);
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (outcome, snap))| closed_record(Direction::Long, outcome, snap, base + Duration::minutes(i as i64)))
            .collect()
    }

    fn learner(records: Vec<SignalRecord>) -> (Arc<MemoryStore>, WeightLearner<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_signals(records));
        let learner = WeightLearner::new(store.clone(), LearningParams::default());
        (store, learner)
    }

    #[test]
    fn losing_long_marks_rsi_and_macd_wrong() {
        let records = history(vec![(Outcome::Lost, rsi_macd_wrong_for_long())]);
        let window: Vec<&SignalRecord> = records.iter().collect();
        let adj = analyse_window(
            &IndicatorWeights::default(),
            &window,
            LearningDirection::Loss,
            &LearningParams::default(),
        );
        let hit: Vec<IndicatorKind> = adj.iter().map(|a| a.indicator).collect();
        assert_eq!(hit, vec![IndicatorKind::Rsi, IndicatorKind::Macd]);
        assert!(adj.iter().all(|a| a.new_weight < a.old_weight));
        assert!(adj.iter().all(|a| (a.change_percent + 15.0).abs() < 1e-9));
    }

    #[test]
    fn loss_streak_cuts_always_wrong_indicator() {
        let (store, learner) = learner(history(vec![
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
        ]));
        let cycle = learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();
        assert_eq!(cycle.triggered_by, TriggeredBy::ConsecutiveLosses);
        assert_eq!(cycle.signals_analyzed, 3);
        assert_eq!(cycle.streak.as_ref().map(|s| s.count), Some(3));

        let weights = learner.current_weights().unwrap();
        assert_invariants(&weights);
        assert!(weights.get(IndicatorKind::Rsi) < 8.0);
        assert!(weights.get(IndicatorKind::Macd) < 8.0);
        // Untouched indicators gain from renormalisation.
        assert!(weights.get(IndicatorKind::Adx) > 7.0);

        assert_eq!(store.list_learning_cycles().unwrap().len(), 1);
        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!((state.cursors.loss, state.version), (3, 1));

        // Same streak is never processed twice.
        assert!(learner.run_learning_cycle(LearningDirection::Loss).unwrap().is_none());
        assert_eq!(learner.current_weights().unwrap(), weights);
    }

    #[test]
    fn half_wrong_adx_cut_at_most_seven_and_a_half_percent() {
        let (_, learner) = learner(history(vec![
            (Outcome::Lost, adx_up()),
            (Outcome::Lost, IndicatorSnapshot::default()),
            (Outcome::Lost, adx_up()),
            (Outcome::Lost, IndicatorSnapshot::default()),
        ]));
        let cycle = learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();
        assert_eq!(cycle.adjustments.len(), 1);
        let adj = &cycle.adjustments[0];
        assert_eq!(adj.indicator, IndicatorKind::Adx);
        assert!((adj.change_percent + 7.5).abs() < 1e-9);
        assert!((adj.old_weight - adj.new_weight).abs() > 0.01);

        let adx = learner.current_weights().unwrap().get(IndicatorKind::Adx);
        assert!(adx < 7.0);
        assert!(adx >= 7.0 * (1.0 - 0.075) - 1e-9);
    }

    #[test]
    fn below_threshold_ratio_changes_nothing() {
        let (_, learner) = learner(history(vec![
            (Outcome::Lost, adx_up()),
            (Outcome::Lost, IndicatorSnapshot::default()),
            (Outcome::Lost, IndicatorSnapshot::default()),
        ]));
        let cycle = learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();
        assert!(cycle.adjustments.is_empty());
        assert_eq!(learner.current_weights().unwrap(), IndicatorWeights::default());
    }

    #[test]
    fn win_streak_boosts_always_correct_indicator() {
        let (_, learner) = learner(history(vec![
            (Outcome::Won, adx_up()),
            (Outcome::Won, adx_up()),
            (Outcome::Won, adx_up()),
        ]));
        let cycle = learner.run_learning_cycle(LearningDirection::Win).unwrap().unwrap();
        assert_eq!(cycle.triggered_by, TriggeredBy::ConsecutiveWins);
        assert!((cycle.adjustments[0].change_percent - 10.0).abs() < 1e-9);

        let weights = learner.current_weights().unwrap();
        assert_invariants(&weights);
        assert!(weights.get(IndicatorKind::Adx) > 7.0);
    }

    #[test]
    fn boost_respects_max_weight() {
        let (store, learner) = learner(history(vec![
            (Outcome::Won, adx_up()),
            (Outcome::Won, adx_up()),
            (Outcome::Won, adx_up()),
        ]));
        let mut weights = IndicatorWeights::default();
        weights.set(IndicatorKind::Adx, 19.5);
        weights.renormalize(MIN, MAX);
        store
            .commit_weight_state(
                0,
                WeightState {
                    weights,
                    ..WeightState::default()
                },
            )
            .unwrap();

        let cycle = learner.run_learning_cycle(LearningDirection::Win).unwrap().unwrap();
        assert!(cycle.adjustments.iter().all(|a| a.new_weight <= MAX));
        assert_invariants(&learner.current_weights().unwrap());
    }

    #[test]
    fn pending_cycles_process_every_streak_once() {
        let mut entries = Vec::new();
        for _ in 0..3 {
            entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
        }
        entries.push((Outcome::Won, adx_up()));
        for _ in 0..4 {
            entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
        }
        for _ in 0..3 {
            entries.push((Outcome::Won, adx_up()));
        }
        let (store, learner) = learner(history(entries));

        let cycles = learner.run_pending_cycles().unwrap();
        let kinds: Vec<TriggeredBy> = cycles.iter().map(|c| c.triggered_by).collect();
        assert_eq!(
            kinds,
            vec![
                TriggeredBy::ConsecutiveLosses,
                TriggeredBy::ConsecutiveLosses,
                TriggeredBy::ConsecutiveWins
            ]
        );
        for cycle in &cycles {
            assert_invariants(&cycle.weights_snapshot);
        }
        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!((state.cursors.loss, state.cursors.win), (8, 11));
        assert!(learner.run_pending_cycles().unwrap().is_empty());
    }

    #[test]
    fn pending_cycles_respect_cap() {
        let mut entries = Vec::new();
        for _ in 0..3 {
            for _ in 0..3 {
                entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
            }
            entries.push((Outcome::Won, IndicatorSnapshot::default()));
        }
        let store = Arc::new(MemoryStore::with_signals(history(entries)));
        let params = LearningParams {
            max_cycles_per_run: 2,
            ..LearningParams::default()
        };
        let learner = WeightLearner::new(store, params);
        assert_eq!(learner.run_pending_cycles().unwrap().len(), 2);
        assert_eq!(learner.run_pending_cycles().unwrap().len(), 1);
    }

    #[test]
    fn scan_budget_advances_cursor_and_still_finds_streak() {
        let mut entries: Vec<(Outcome, IndicatorSnapshot)> = (0..12)
            .map(|i| {
                let o = if i % 2 == 0 { Outcome::Won } else { Outcome::Lost };
                (o, IndicatorSnapshot::default())
            })
            .collect();
        for _ in 0..3 {
            entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
        }
        let store = Arc::new(MemoryStore::with_signals(history(entries)));
        let params = LearningParams {
            max_scan: 4,
            ..LearningParams::default()
        };
        let learner = WeightLearner::new(store.clone(), params);
        let cycle = learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();
        let streak = cycle.streak.unwrap();
        // Index 11 is a lone LOST that joins the three trailing losses.
        assert_eq!((streak.start, streak.count), (11, 4));
        assert_eq!(store.load_weight_state().unwrap().unwrap().cursors.loss, 15);
    }

    #[test]
    fn zero_scan_budget_still_finds_streak() {
        let store = Arc::new(MemoryStore::with_signals(history(vec![
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
        ])));
        let params = LearningParams {
            max_scan: 0,
            ..LearningParams::default()
        };
        let learner = WeightLearner::new(store.clone(), params);
        let cycle = learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();
        assert_eq!(cycle.streak.map(|s| s.count), Some(3));
        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!((state.cursors.loss, state.version), (3, 1));
    }

    #[test]
    fn scan_rounds_per_call_are_bounded() {
        let mut entries: Vec<(Outcome, IndicatorSnapshot)> = (0..200)
            .map(|i| {
                let o = if i % 2 == 0 { Outcome::Won } else { Outcome::Lost };
                (o, IndicatorSnapshot::default())
            })
            .collect();
        entries.extend((0..3).map(|_| (Outcome::Lost, rsi_macd_wrong_for_long())));
        let store = Arc::new(MemoryStore::with_signals(history(entries)));
        let params = LearningParams {
            max_scan: 1,
            ..LearningParams::default()
        };
        let learner = WeightLearner::new(store.clone(), params);

        // One record per round: the first call stops after 64 rounds.
        assert!(learner.run_learning_cycle(LearningDirection::Loss).unwrap().is_none());
        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!((state.cursors.loss, state.version), (64, 64));

        let found = (0..3).find_map(|_| learner.run_learning_cycle(LearningDirection::Loss).unwrap());
        let streak = found.and_then(|c| c.streak).unwrap();
        assert_eq!((streak.start, streak.count), (199, 4));
    }

    #[test]
    fn recovery_converges_to_default() {
        let mut entries = vec![(Outcome::Lost, rsi_macd_wrong_for_long())];
        entries.extend((0..25).map(|_| (Outcome::Won, IndicatorSnapshot::default())));
        let (store, learner) = learner(history(entries));

        let mut weights = IndicatorWeights::default();
        weights.set(IndicatorKind::Rsi, 3.0);
        weights.renormalize(MIN, MAX);
        store
            .commit_weight_state(
                0,
                WeightState {
                    weights,
                    ..WeightState::default()
                },
            )
            .unwrap();

        let first = learner.recover_weights().unwrap();
        assert!(first.iter().any(|a| a.indicator == IndicatorKind::Rsi && a.new_weight > a.old_weight));
        assert_invariants(&learner.current_weights().unwrap());

        for _ in 0..400 {
            learner.recover_weights().unwrap();
        }
        let weights = learner.current_weights().unwrap();
        assert_invariants(&weights);
        assert!((weights.get(IndicatorKind::Rsi) - 8.0).abs() < 0.05);

        let recoveries = store
            .list_learning_cycles()
            .unwrap()
            .iter()
            .filter(|c| c.triggered_by == TriggeredBy::Recovery)
            .count();
        assert!(recoveries >= 2);
    }

    #[test]
    fn recovery_settles_after_win_boost() {
        let mut entries: Vec<(Outcome, IndicatorSnapshot)> = (0..3).map(|_| (Outcome::Won, adx_up())).collect();
        entries.push((Outcome::Lost, IndicatorSnapshot::default()));
        entries.extend((0..26).map(|_| (Outcome::Won, IndicatorSnapshot::default())));
        let (store, learner) = learner(history(entries));
        learner.run_learning_cycle(LearningDirection::Win).unwrap().unwrap();
        assert!(learner.current_weights().unwrap().get(IndicatorKind::Adx) > 7.0);

        let mut commits = 0;
        for _ in 0..200 {
            if !learner.recover_weights().unwrap().is_empty() {
                commits += 1;
            }
        }
        // Each commit gives back part of the boost; it stops once the net
        // move after renormalisation drops under the materiality floor.
        assert!(commits > 0 && commits < 50, "recovery commits: {commits}");

        let version = learner.weight_state().unwrap().version;
        for _ in 0..10 {
            assert!(learner.recover_weights().unwrap().is_empty());
        }
        assert_eq!(learner.weight_state().unwrap().version, version);
        assert_eq!(store.list_learning_cycles().unwrap().len(), 1 + commits);
        assert_invariants(&learner.current_weights().unwrap());
    }

    #[test]
    fn recovery_steps_are_material() {
        let mut weights = IndicatorWeights::default();
        weights.set(IndicatorKind::Rsi, 7.9);
        weights.set(IndicatorKind::Macd, 7.995);
        let closed = history((0..25).map(|_| (Outcome::Won, IndicatorSnapshot::default())).collect());

        let adjustments = recovery_adjustments(&weights, &closed, &LearningParams::default());
        // 5% of a 0.1 gap is immaterial, so the gap closes in one step.
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].indicator, IndicatorKind::Rsi);
        assert!((adjustments[0].new_weight - 8.0).abs() < 1e-12);
    }

    #[test]
    fn recent_wrong_call_blocks_recovery() {
        let mut entries: Vec<(Outcome, IndicatorSnapshot)> =
            (0..25).map(|_| (Outcome::Won, IndicatorSnapshot::default())).collect();
        entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
        let (store, learner) = learner(history(entries));

        let mut weights = IndicatorWeights::default();
        weights.set(IndicatorKind::Rsi, 3.0);
        weights.set(IndicatorKind::Adx, 12.0);
        weights.renormalize(MIN, MAX);
        store
            .commit_weight_state(
                0,
                WeightState {
                    weights,
                    ..WeightState::default()
                },
            )
            .unwrap();

        let adjustments = learner.recover_weights().unwrap();
        assert!(adjustments.iter().all(|a| a.indicator != IndicatorKind::Rsi));
        assert!(adjustments.iter().all(|a| a.indicator != IndicatorKind::Macd));
    }

    #[test]
    fn recovery_without_history_is_noop() {
        let (store, learner) = learner(Vec::new());
        assert!(learner.recover_weights().unwrap().is_empty());
        assert!(store.load_weight_state().unwrap().is_none());
        assert!(store.list_learning_cycles().unwrap().is_empty());
    }

    #[test]
    fn manual_cycle_keeps_cursors() {
        let (store, learner) = learner(history(vec![
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Won, adx_up()),
        ]));
        let cycle = learner.run_manual_cycle().unwrap().unwrap();
        assert_eq!(cycle.triggered_by, TriggeredBy::Manual);
        assert_eq!(cycle.signals_analyzed, 2);
        let indicators: Vec<IndicatorKind> = cycle.adjustments.iter().map(|a| a.indicator).collect();
        assert!(indicators.contains(&IndicatorKind::Rsi));
        assert!(indicators.contains(&IndicatorKind::Adx));

        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!(state.cursors, StreakCursors::default());
        assert_invariants(&state.weights);
    }

    #[test]
    fn stale_writer_is_rejected() {
        let (store, learner) = learner(history(vec![
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
            (Outcome::Lost, rsi_macd_wrong_for_long()),
        ]));
        let stale = learner.weight_state().unwrap();
        learner.run_learning_cycle(LearningDirection::Loss).unwrap().unwrap();

        // A second writer that loaded before the cycle cannot overwrite it.
        let result = store.commit_weight_state(stale.version, stale);
        assert!(matches!(result, Err(EngineError::ConcurrentModification { .. })));
        assert_eq!(store.load_weight_state().unwrap().unwrap().cursors.loss, 3);
    }

    #[test]
    fn learner_serialises_concurrent_callers() {
        let mut entries = Vec::new();
        for _ in 0..4 {
            for _ in 0..3 {
                entries.push((Outcome::Lost, rsi_macd_wrong_for_long()));
            }
            entries.push((Outcome::Won, IndicatorSnapshot::default()));
        }
        let store = Arc::new(MemoryStore::with_signals(history(entries)));
        let learner = Arc::new(WeightLearner::new(store.clone(), LearningParams::default()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let learner = learner.clone();
                std::thread::spawn(move || learner.run_learning_cycle(LearningDirection::Loss).unwrap())
            })
            .collect();
        let processed = handles.into_iter().filter_map(|h| h.join().unwrap()).count();

        assert_eq!(processed, 4);
        assert_eq!(store.list_learning_cycles().unwrap().len(), 4);
        let state = store.load_weight_state().unwrap().unwrap();
        assert_eq!((state.cursors.loss, state.version), (15, 4));
        assert_invariants(&state.weights);
    }
}
