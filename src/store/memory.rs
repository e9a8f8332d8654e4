// =============================================================================
// In-memory record store
// =============================================================================
//
// Thread-safety: all mutable state is behind one `parking_lot::RwLock`, so a
// weight commit and its version check happen under the same write guard.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::exit::{SignalRecord, Transition};
use crate::learning::LearningCycle;

use super::{closed_chronological, RecordStore, WeightState};

/// Everything a store holds. Also the on-disk document of `JsonFileStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub weight_state: Option<WeightState>,
    #[serde(default)]
    pub signals: Vec<SignalRecord>,
    #[serde(default)]
    pub learning_cycles: Vec<LearningCycle>,
}

impl StoreDocument {
    pub(crate) fn commit(&mut self, expected_version: u64, mut state: WeightState) -> Result<WeightState> {
        let found = self.weight_state.as_ref().map_or(0, |s| s.version);
        if found != expected_version {
            return Err(EngineError::ConcurrentModification {
                expected: expected_version,
                found,
            });
        }
        state.weights.validate()?;
        state.version = expected_version + 1;
        state.updated_at = Some(Utc::now());
        self.weight_state = Some(state.clone());
        Ok(state)
    }

    pub(crate) fn commit_cycle(
        &mut self,
        expected_version: u64,
        state: WeightState,
        cycle: LearningCycle,
    ) -> Result<WeightState> {
        let committed = self.commit(expected_version, state)?;
        self.learning_cycles.push(cycle);
        Ok(committed)
    }

    pub(crate) fn insert(&mut self, record: SignalRecord) -> Result<()> {
        if self.signals.iter().any(|r| r.id() == record.id()) {
            return Err(EngineError::Store(format!("signal {} already recorded", record.id())));
        }
        self.signals.push(record);
        Ok(())
    }

    pub(crate) fn apply(&mut self, transition: &Transition) -> Result<bool> {
        let record = self
            .signals
            .iter_mut()
            .find(|r| r.id() == transition.signal_id)
            .ok_or_else(|| EngineError::Store(format!("unknown signal {}", transition.signal_id)))?;
        let applied = record.apply(transition);
        if !applied {
            debug!(id = %transition.signal_id, "Transition ignored, record already terminal");
        }
        Ok(applied)
    }

    pub(crate) fn open_signals(&self) -> Vec<SignalRecord> {
        self.signals.iter().filter(|r| !r.is_terminal()).cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with signal records, e.g. replayed history.
    pub fn with_signals(signals: Vec<SignalRecord>) -> Self {
        Self {
            doc: RwLock::new(StoreDocument {
                signals,
                ..StoreDocument::default()
            }),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load_weight_state(&self) -> Result<Option<WeightState>> {
        Ok(self.doc.read().weight_state.clone())
    }

    fn commit_weight_state(&self, expected_version: u64, state: WeightState) -> Result<WeightState> {
        self.doc.write().commit(expected_version, state)
    }

    fn commit_learning_cycle(
        &self,
        expected_version: u64,
        state: WeightState,
        cycle: LearningCycle,
    ) -> Result<WeightState> {
        self.doc.write().commit_cycle(expected_version, state, cycle)
    }

    fn list_learning_cycles(&self) -> Result<Vec<LearningCycle>> {
        Ok(self.doc.read().learning_cycles.clone())
    }

    fn insert_signal(&self, record: SignalRecord) -> Result<()> {
        self.doc.write().insert(record)
    }

    fn list_open_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(self.doc.read().open_signals())
    }

    fn list_closed_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(closed_chronological(&self.doc.read().signals))
    }

    fn update_signal_terminal(&self, transition: &Transition) -> Result<bool> {
        self.doc.write().apply(transition)
    }
}
