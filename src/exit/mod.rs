// =============================================================================
// Exit / Outcome Module
// =============================================================================
//
// Resolves recorded signals against live prices: take profit, stop loss,
// re-confirmed early exit, timeout and manual close.

pub mod reconfirm;
pub mod tracker;

pub use reconfirm::{DualTimeframeMomentum, MomentumReading};
pub use tracker::{check_outcomes, ExitReason, Outcome, SignalRecord, Transition};
