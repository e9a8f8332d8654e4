// =============================================================================
// JSON file record store
// =============================================================================
//
// The whole store is one JSON document, rewritten on every mutation with an
// atomic tmp + rename so a crash never leaves a half-written file. Mutations
// are applied to a copy first; the in-memory document only changes once the
// new file is on disk.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::exit::{SignalRecord, Transition};
use crate::learning::LearningCycle;

use super::memory::StoreDocument;
use super::{closed_chronological, RecordStore, WeightState};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: RwLock<StoreDocument>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let doc: StoreDocument = serde_json::from_str(&content)?;
            info!(
                path = %path.display(),
                signals = doc.signals.len(),
                cycles = doc.learning_cycles.len(),
                version = doc.weight_state.as_ref().map_or(0, |s| s.version),
                "Record store loaded"
            );
            doc
        } else {
            warn!(path = %path.display(), "Record store file not found, starting empty");
            StoreDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, doc: &StoreDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| EngineError::Store(format!("failed to replace {}: {e}", self.path.display())))
    }

    /// Run `f` against a copy of the document, persist, then publish.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
        let mut guard = self.doc.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

impl RecordStore for JsonFileStore {
    fn load_weight_state(&self) -> Result<Option<WeightState>> {
        Ok(self.doc.read().weight_state.clone())
    }

    fn commit_weight_state(&self, expected_version: u64, state: WeightState) -> Result<WeightState> {
        self.mutate(|doc| doc.commit(expected_version, state))
    }

    fn commit_learning_cycle(
        &self,
        expected_version: u64,
        state: WeightState,
        cycle: LearningCycle,
    ) -> Result<WeightState> {
        self.mutate(|doc| doc.commit_cycle(expected_version, state, cycle))
    }

    fn list_learning_cycles(&self) -> Result<Vec<LearningCycle>> {
        Ok(self.doc.read().learning_cycles.clone())
    }

    fn insert_signal(&self, record: SignalRecord) -> Result<()> {
        self.mutate(|doc| doc.insert(record))
    }

    fn list_open_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(self.doc.read().open_signals())
    }

    fn list_closed_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(closed_chronological(&self.doc.read().signals))
    }

    fn update_signal_terminal(&self, transition: &Transition) -> Result<bool> {
        {
            // Already-terminal deliveries skip the rewrite.
            let doc = self.doc.read();
            if let Some(record) = doc.signals.iter().find(|r| r.id() == transition.signal_id) {
                if record.is_terminal() {
                    return Ok(false);
                }
            }
        }
        self.mutate(|doc| doc.apply(transition))
    }
}
