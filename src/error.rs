// =============================================================================
// Engine errors
// =============================================================================
//
// Only genuinely invalid inputs surface as errors. Short history, missing
// collaborator data and "no streak found" are normal results handled where
// they occur.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("weight map is missing mandatory indicator `{0}`")]
    MissingIndicator(String),

    #[error("invalid weight {weight} for indicator `{indicator}`")]
    InvalidWeight { indicator: String, weight: f64 },

    #[error("weight state changed concurrently (expected version {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
