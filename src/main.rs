// =============================================================================
// Signal Engine — Main Entry Point
// =============================================================================
//
// Polls public futures market data, scores every configured coin, tracks
// the outcome of each directional call and feeds the results back into the
// indicator weights. No orders are ever placed.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use signal_engine::config::{EngineConfig, DEFAULT_CONFIG_PATH};
use signal_engine::market_data::BinanceFuturesProvider;
use signal_engine::runner::SignalRunner;
use signal_engine::store::{JsonFileStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Signal Engine starting up");

    let config_path = std::env::var("ENGINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = EngineConfig::load_or_default(&config_path);
    config.apply_env();

    info!(
        coins = ?config.runner.coins,
        reference = %config.runner.reference_coin,
        interval = %config.runner.interval,
        poll_secs = config.runner.poll_secs,
        "Configured coins"
    );

    // ── 2. Record store ──────────────────────────────────────────────────
    let store = Arc::new(
        JsonFileStore::open(&config.runner.store_path)
            .with_context(|| format!("failed to open record store {}", config.runner.store_path.display()))?,
    );
    let open = store.list_open_signals()?.len();
    info!(path = %store.path().display(), open, "Record store ready");

    // ── 3. Market data provider ──────────────────────────────────────────
    let provider = Arc::new(BinanceFuturesProvider::new()?);

    // ── 4. Polling loop ──────────────────────────────────────────────────
    let poll = std::time::Duration::from_secs(config.runner.poll_secs.max(1));
    let runner = SignalRunner::new(provider, store, config);
    let weights = runner.learner().current_weights()?;
    info!(weights = ?weights.to_named(), "Indicator weights loaded");

    let mut interval = tokio::time::interval(poll);
    info!("Polling loop running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = runner.run_cycle().await {
                    error!(error = %e, "Cycle failed, retrying next tick");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                warn!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    info!("Signal Engine shut down complete.");
    Ok(())
}
