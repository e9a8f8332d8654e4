// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market-wide regime classification from the reference asset's trend and
// volatility, peer breadth, and derivatives positioning. The detected regime
// scales the scoring engine's thresholds and category weights.

pub mod detector;

pub use detector::{
    classify, MarketRegime, RegimeContext, RegimeDetector, RegimeProfile, RegimeState, TrendDirection,
    VolatilityLevel,
};
