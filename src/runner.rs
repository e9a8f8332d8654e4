// =============================================================================
// Signal Runner — one polling cycle end to end
// =============================================================================
//
//   1. fetch bars + positioning per coin, sentiment once
//   2. regime from the reference coin and the peer readings
//   3. score every coin with the stored weights
//   4. open a record for each LONG / SHORT call on a coin with no PENDING one
//   5. resolve PENDING records (fast + slow timeframe momentum)
//   6. streak learning cycles, then recovery
//
// A coin whose fetch or scoring fails is skipped for this cycle; the rest of
// the cycle carries on.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::exit::{check_outcomes, DualTimeframeMomentum, SignalRecord};
use crate::indicators::roc::recent_change_pct;
use crate::indicators::PositioningContext;
use crate::learning::WeightLearner;
use crate::market_data::MarketDataProvider;
use crate::regime::detector::DAY_BARS;
use crate::regime::{MarketRegime, RegimeContext, RegimeDetector, RegimeState};
use crate::signals::{MarketContext, WeightedScorer};
use crate::store::RecordStore;
use crate::types::{Bar, Direction};

/// Bars fetched on the fast re-confirmation timeframe.
const FAST_BAR_COUNT: usize = 100;

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub regime: MarketRegime,
    pub scored: usize,
    pub opened: usize,
    pub closed: usize,
    pub learning_cycles: usize,
    pub recovered: usize,
}

/// Fetched inputs for one coin.
struct CoinView {
    coin: String,
    bars: Vec<Bar>,
    positioning: Option<PositioningContext>,
}

pub struct SignalRunner<P: MarketDataProvider + ?Sized, S: RecordStore + ?Sized> {
    provider: Arc<P>,
    store: Arc<S>,
    learner: WeightLearner<S>,
    scorer: WeightedScorer,
    detector: Arc<RegimeDetector>,
    config: EngineConfig,
}

impl<P: MarketDataProvider + ?Sized, S: RecordStore + ?Sized> SignalRunner<P, S> {
    pub fn new(provider: Arc<P>, store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            learner: WeightLearner::new(store.clone(), config.learning.clone()),
            scorer: WeightedScorer::new(config.scoring.clone(), config.risk.clone()),
            detector: RegimeDetector::new(),
            provider,
            store,
            config,
        }
    }

    pub fn learner(&self) -> &WeightLearner<S> {
        &self.learner
    }

    pub fn current_regime(&self) -> Option<RegimeState> {
        self.detector.current()
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let settings = &self.config.runner;

        // ── 1. Fetch ───────────────────────────────────────────────────────
        let sentiment = self.provider.fetch_sentiment_index().await;
        let mut views = Vec::with_capacity(settings.coins.len());
        for coin in &settings.coins {
            if let Some(view) = self.fetch_view(coin).await {
                views.push(view);
            }
        }

        // ── 2. Regime ──────────────────────────────────────────────────────
        let regime = self.detect_regime(&views).await;

        // ── 3 + 4. Score and open records ──────────────────────────────────
        let weights = self.learner.current_weights()?;
        let mut pending: HashSet<String> = self
            .store
            .list_open_signals()?
            .iter()
            .map(|r| r.coin().to_string())
            .collect();

        let mut scored = 0;
        let mut opened = 0;
        for view in &views {
            let market = MarketContext {
                sentiment,
                positioning: view.positioning.as_ref(),
            };
            let signal = match self.scorer.score(&view.bars, &view.coin, market, Some(&weights), Some(&regime)) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(coin = %view.coin, error = %e, "Scoring failed, coin skipped this cycle");
                    continue;
                }
            };
            scored += 1;

            if signal.direction == Direction::Hold {
                continue;
            }
            if pending.contains(&view.coin) {
                debug!(coin = %view.coin, direction = %signal.direction, "Coin already has a pending signal");
                continue;
            }
            info!(
                coin = %signal.coin,
                direction = %signal.direction,
                score = format!("{:.0}", signal.score),
                entry = signal.entry_price,
                sl = format!("{:.4}", signal.stop_loss),
                tp = format!("{:.4}", signal.take_profit),
                rr = format!("{:.2}", signal.risk_reward_ratio),
                regime = %signal.regime,
                "Signal opened"
            );
            self.store.insert_signal(SignalRecord::open(signal))?;
            pending.insert(view.coin.clone());
            opened += 1;
        }

        // ── 5. Outcomes ────────────────────────────────────────────────────
        let closed = self.resolve_outcomes(&views).await?;

        // ── 6. Learning ────────────────────────────────────────────────────
        let learning_cycles = match self.learner.run_pending_cycles() {
            Ok(cycles) => cycles.len(),
            Err(EngineError::ConcurrentModification { .. }) => 0,
            Err(e) => return Err(e.into()),
        };
        let recovered = match self.learner.recover_weights() {
            Ok(adjustments) => adjustments.len(),
            Err(EngineError::ConcurrentModification { .. }) => 0,
            Err(e) => return Err(e.into()),
        };

        let report = CycleReport {
            regime: regime.regime,
            scored,
            opened,
            closed,
            learning_cycles,
            recovered,
        };
        info!(
            regime = %report.regime,
            scored = report.scored,
            opened = report.opened,
            closed = report.closed,
            learning_cycles = report.learning_cycles,
            recovered = report.recovered,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn fetch_view(&self, coin: &str) -> Option<CoinView> {
        let settings = &self.config.runner;
        let bars = match self.provider.fetch_bars(coin, &settings.interval, settings.bar_count).await {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                warn!(coin, "No bars returned, coin skipped this cycle");
                return None;
            }
            Err(e) => {
                warn!(coin, error = %e, "Bar fetch failed, coin skipped this cycle");
                return None;
            }
        };
        let positioning = self.provider.fetch_positioning_context(coin).await;
        Some(CoinView {
            coin: coin.to_string(),
            bars,
            positioning,
        })
    }

    async fn detect_regime(&self, views: &[CoinView]) -> RegimeState {
        let settings = &self.config.runner;
        let reference = &settings.reference_coin;

        let fetched;
        let reference_bars: &[Bar] = match views.iter().find(|v| &v.coin == reference) {
            Some(view) => &view.bars,
            None => {
                fetched = self
                    .provider
                    .fetch_bars(reference, &settings.interval, settings.bar_count)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(coin = %reference, error = %e, "Reference bars unavailable, regime UNKNOWN");
                        Vec::new()
                    });
                &fetched
            }
        };

        let peer_changes: Vec<f64> = views
            .iter()
            .filter(|v| &v.coin != reference)
            .filter_map(|v| {
                let closes: Vec<f64> = v.bars.iter().map(|b| b.close).collect();
                recent_change_pct(&closes, DAY_BARS)
            })
            .collect();
        let fundings: Vec<f64> = views
            .iter()
            .filter_map(|v| v.positioning.as_ref().map(|p| p.funding_rate_pct()))
            .collect();
        let oi_changes: Vec<f64> = views
            .iter()
            .filter_map(|v| v.positioning.as_ref().and_then(|p| p.oi_change_pct()))
            .collect();

        let ctx = RegimeContext::from_market(reference_bars, &peer_changes, &fundings, &oi_changes);
        self.detector.update(ctx)
    }

    /// Check every PENDING record against the latest close and persist the
    /// terminal transitions. Returns how many records closed.
    async fn resolve_outcomes(&self, views: &[CoinView]) -> Result<usize> {
        let open = self.store.list_open_signals()?;
        if open.is_empty() {
            return Ok(0);
        }

        let prices: HashMap<String, f64> = views
            .iter()
            .filter_map(|v| v.bars.last().map(|b| (v.coin.clone(), b.close)))
            .collect();

        let mut momentum = HashMap::new();
        let open_coins: HashSet<&str> = open.iter().map(|r| r.coin()).collect();
        for view in views.iter().filter(|v| open_coins.contains(v.coin.as_str())) {
            let fast_bars = match self
                .provider
                .fetch_bars(&view.coin, &self.config.runner.fast_interval, FAST_BAR_COUNT)
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    // Without the fast timeframe no reversal can be confirmed.
                    warn!(coin = %view.coin, error = %e, "Fast timeframe unavailable");
                    Vec::new()
                }
            };
            momentum.insert(view.coin.clone(), DualTimeframeMomentum::from_bars(&fast_bars, &view.bars));
        }

        let transitions = check_outcomes(&open, &prices, &momentum, Utc::now(), &self.config.outcome);
        let mut closed = 0;
        for transition in &transitions {
            if self.store.update_signal_terminal(transition)? {
                closed += 1;
            }
        }
        Ok(closed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::exit::Outcome;
    use crate::indicators::IndicatorSnapshot;
    use crate::store::memory::tests::record_with;
    use crate::store::MemoryStore;

    /// Serves the same steadily rising series for every coin and interval.
    struct FakeProvider {
        bars: Vec<Bar>,
        missing: Vec<String>,
    }

    impl FakeProvider {
        fn rising(step: f64) -> Self {
            let start = Utc::now() - Duration::hours(200);
            let mut price = 100.0;
            let bars = (0..200)
                .map(|i| {
                    let open = price;
                    price *= 1.0 + step;
                    Bar::new(
                        open,
                        price * 1.002,
                        open * 0.998,
                        price,
                        1_000.0 + i as f64,
                        start + Duration::hours(i),
                    )
                })
                .collect();
            Self {
                bars,
                missing: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        async fn fetch_bars(&self, coin: &str, _interval: &str, count: usize) -> anyhow::Result<Vec<Bar>> {
            if self.missing.iter().any(|m| m == coin) {
                anyhow::bail!("no market for {coin}");
            }
            let skip = self.bars.len().saturating_sub(count);
            Ok(self.bars[skip..].to_vec())
        }

        async fn fetch_sentiment_index(&self) -> Option<i64> {
            Some(50)
        }

        async fn fetch_positioning_context(&self, _coin: &str) -> Option<PositioningContext> {
            None
        }
    }

    fn config(coins: &[&str]) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.runner.coins = coins.iter().map(|c| c.to_string()).collect();
        config
    }

    #[tokio::test]
    async fn cycle_scores_every_coin_and_never_double_opens() {
        let store = Arc::new(MemoryStore::new());
        let runner = SignalRunner::new(Arc::new(FakeProvider::rising(0.005)), store.clone(), config(&["BTC", "ETH"]));

        let first = runner.run_cycle().await.unwrap();
        assert_eq!(first.scored, 2);
        let second = runner.run_cycle().await.unwrap();
        assert_eq!(second.scored, 2);

        let open = store.list_open_signals().unwrap();
        let mut coins: Vec<&str> = open.iter().map(|r| r.coin()).collect();
        coins.sort_unstable();
        coins.dedup();
        assert_eq!(coins.len(), open.len());
        assert!(open.iter().all(|r| r.direction() != Direction::Hold));
        assert!(runner.current_regime().is_some());
    }

    #[tokio::test]
    async fn pending_record_resolves_against_latest_close() {
        // LONG at 100 with TP 110; the fake market closes far above that.
        let record = record_with(Direction::Long, IndicatorSnapshot::default(), Utc::now());
        let id = record.id();
        let store = Arc::new(MemoryStore::with_signals(vec![record]));
        let runner = SignalRunner::new(Arc::new(FakeProvider::rising(0.005)), store.clone(), config(&["BTC"]));

        let report = runner.run_cycle().await.unwrap();
        assert_eq!(report.closed, 1);
        let closed = store.list_closed_signals().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id(), id);
        assert_eq!(closed[0].outcome, Outcome::Won);
    }

    #[tokio::test]
    async fn failing_coin_is_skipped() {
        let mut provider = FakeProvider::rising(0.002);
        provider.missing.push("SOL".to_string());
        let runner = SignalRunner::new(Arc::new(provider), Arc::new(MemoryStore::new()), config(&["BTC", "SOL"]));

        let report = runner.run_cycle().await.unwrap();
        assert_eq!(report.scored, 1);
    }

    #[tokio::test]
    async fn works_through_trait_objects() {
        let provider: Arc<dyn MarketDataProvider> = Arc::new(FakeProvider::rising(0.001));
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let runner = SignalRunner::new(provider, store, config(&["ETH"]));

        // Reference coin BTC is not in the list and is fetched separately.
        let report = runner.run_cycle().await.unwrap();
        assert_eq!(report.scored, 1);
        assert_eq!(report.learning_cycles, 0);
    }
}
