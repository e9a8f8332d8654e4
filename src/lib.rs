// =============================================================================
// Signal Engine — library root
// =============================================================================
//
// Weighted technical-indicator scoring for crypto perpetuals, with ATR and
// structure based risk levels, regime awareness, outcome tracking and
// streak-driven weight learning.

pub mod config;
pub mod error;
pub mod exit;
pub mod indicators;
pub mod learning;
pub mod market_data;
pub mod regime;
pub mod risk;
pub mod runner;
pub mod signals;
pub mod store;
pub mod types;

pub use error::{EngineError, Result};
