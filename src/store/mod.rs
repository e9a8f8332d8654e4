// =============================================================================
// Record Store — signals, weight state, learning audit trail
// =============================================================================
//
// The engine never owns persistence. It talks to a `RecordStore`, which
// keeps:
//   - every signal record (append-only; each PENDING record closed once)
//   - the weight state: weights + streak cursors + a version token
//   - the learning-cycle audit log (append-only)
//
// `commit_weight_state` is a compare-and-set on the version token: a writer
// that loaded version N may only commit if the store is still at N. The
// committed state carries N + 1. `commit_learning_cycle` does the same and
// appends the audit record in the same write, so weights never change
// without their cycle on record.

pub mod json_file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::exit::{SignalRecord, Transition};
use crate::learning::LearningCycle;
use crate::signals::IndicatorWeights;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Positions in the chronological closed-signal list from which the next
/// streak scans start. Everything before a cursor has been processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakCursors {
    pub loss: usize,
    pub win: usize,
}

/// The learnable state, versioned for optimistic concurrency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightState {
    pub weights: IndicatorWeights,
    #[serde(default)]
    pub cursors: StreakCursors,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub trait RecordStore: Send + Sync {
    /// Current weight state, `None` before the first commit.
    fn load_weight_state(&self) -> Result<Option<WeightState>>;

    /// Replace the weight state if the stored version still equals
    /// `expected_version` (0 when nothing is stored). Returns the committed
    /// state with its new version.
    fn commit_weight_state(&self, expected_version: u64, state: WeightState) -> Result<WeightState>;

    /// `commit_weight_state` plus the cycle's audit record, as one write.
    /// On a version conflict neither is stored.
    fn commit_learning_cycle(
        &self,
        expected_version: u64,
        state: WeightState,
        cycle: LearningCycle,
    ) -> Result<WeightState>;

    fn list_learning_cycles(&self) -> Result<Vec<LearningCycle>>;

    /// Record a freshly scored signal as PENDING.
    fn insert_signal(&self, record: SignalRecord) -> Result<()>;

    fn list_open_signals(&self) -> Result<Vec<SignalRecord>>;

    /// WON / LOST records ordered by close time, oldest first.
    fn list_closed_signals(&self) -> Result<Vec<SignalRecord>>;

    /// Apply a terminal transition. `Ok(false)` when the record was already
    /// terminal, so repeated delivery is harmless.
    fn update_signal_terminal(&self, transition: &Transition) -> Result<bool>;
}

/// Closed records in chronological close order.
pub(crate) fn closed_chronological(records: &[SignalRecord]) -> Vec<SignalRecord> {
    let mut closed: Vec<SignalRecord> = records.iter().filter(|r| r.is_terminal()).cloned().collect();
    closed.sort_by_key(|r| (r.closed_at, r.signal.timestamp));
    closed
}
