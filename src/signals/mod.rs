// =============================================================================
// Signals Module
// =============================================================================
//
// Signal scoring pipeline:
// - Learnable indicator weight vector (shared with the weight learner)
// - Weighted ensemble scoring (regime-aware) into LONG / SHORT / HOLD

pub mod weighted_score;
pub mod weights;

pub use weighted_score::{CategoryScore, MarketContext, SignalContribution, SignalOutput, WeightedScorer};
pub use weights::IndicatorWeights;
