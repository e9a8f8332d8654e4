// =============================================================================
// Learning Module
// =============================================================================
//
// Closed outcomes feed back into the indicator weights:
// - Streak scanning over the chronological closed list (cursor based)
// - Loss / win adjustment, recovery toward defaults, audit trail

pub mod learner;
pub mod streak;

pub use learner::{
    analyse_window, recovery_adjustments, LearningCycle, LearningDirection, TriggeredBy, WeightAdjustment,
    WeightLearner,
};
pub use streak::{scan_for_streak, ScanResult, Streak};
