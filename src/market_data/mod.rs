// =============================================================================
// Market Data — collaborator boundary
// =============================================================================
//
// The scoring core never fetches anything. A `MarketDataProvider` supplies
// bars, the sentiment index and the positioning context; any of them may be
// unavailable, in which case the affected readings go neutral.

pub mod binance;

use async_trait::async_trait;

use crate::indicators::PositioningContext;
use crate::types::Bar;

pub use binance::BinanceFuturesProvider;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Up to `count` most recent bars, oldest first.
    async fn fetch_bars(&self, coin: &str, interval: &str, count: usize) -> anyhow::Result<Vec<Bar>>;

    /// Fear & Greed index (0..=100), `None` when unavailable.
    async fn fetch_sentiment_index(&self) -> Option<i64>;

    /// Funding / open interest / volume / premium, `None` when unavailable.
    async fn fetch_positioning_context(&self, coin: &str) -> Option<PositioningContext>;
}
