// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the scoring engine
// weighs. Raw calculators return `Option<T>` (or an empty series) so callers
// are forced to handle insufficient history; classifiers turn a raw value
// into an `IndicatorResult`. Nothing here performs I/O or returns an error.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod ichimoku;
pub mod kind;
pub mod macd;
pub mod oscillators;
pub mod positioning;
pub mod roc;
pub mod rsi;
pub mod snapshot;
pub mod volume;

pub use kind::{Category, IndicatorKind};
pub use positioning::PositioningContext;
pub use snapshot::IndicatorSnapshot;
