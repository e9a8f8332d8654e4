// =============================================================================
// Engine Configuration — tunable parameters with atomic save
// =============================================================================
//
// Every tunable of the signal engine lives here: scoring thresholds, risk
// level sizing, outcome tracking, the weight learner's control loop, and the
// runner's polling settings.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry a serde default so that adding new fields never
// breaks loading an older config file.
//
// Environment overrides (applied after the file, `.env` honoured):
//   ENGINE_CONFIG  path of the JSON config file
//   ENGINE_COINS   comma-separated coin list
//   ENGINE_STORE   path of the JSON record store
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "engine_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_threshold() -> f64 {
    25.0
}

fn default_min_bias_fraction() -> f64 {
    0.05
}

fn default_agreement_floor() -> f64 {
    0.3
}

fn default_atr_period() -> usize {
    14
}

fn default_sl_atr_multiplier() -> f64 {
    1.5
}

fn default_tp_atr_multiplier() -> f64 {
    3.0
}

fn default_min_distance_pct() -> f64 {
    2.0
}

fn default_min_risk_reward() -> f64 {
    1.5
}

fn default_pivot_span() -> usize {
    3
}

fn default_level_buffer_pct() -> f64 {
    0.1
}

fn default_early_exit_pct() -> f64 {
    3.0
}

fn default_max_hold_hours() -> i64 {
    72
}

fn default_streak_length() -> usize {
    3
}

fn default_analysis_window() -> usize {
    20
}

fn default_loss_ratio_threshold() -> f64 {
    0.5
}

fn default_loss_max_adjust() -> f64 {
    0.15
}

fn default_win_ratio_threshold() -> f64 {
    0.6
}

fn default_win_max_adjust() -> f64 {
    0.10
}

fn default_recovery_after_trades() -> usize {
    20
}

fn default_recovery_rate() -> f64 {
    0.05
}

fn default_min_weight() -> f64 {
    1.0
}

fn default_max_weight() -> f64 {
    20.0
}

fn default_materiality_floor() -> f64 {
    0.01
}

fn default_max_scan() -> usize {
    10_000
}

fn default_max_cycles_per_run() -> usize {
    50
}

fn default_coins() -> Vec<String> {
    ["BTC", "ETH", "SOL", "BNB", "XRP"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_reference_coin() -> String {
    "BTC".to_string()
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_bar_count() -> usize {
    200
}

fn default_poll_secs() -> u64 {
    300
}

fn default_store_path() -> PathBuf {
    PathBuf::from("signal_store.json")
}

fn default_fast_interval() -> String {
    "15m".to_string()
}

// =============================================================================
// ScoringParams
// =============================================================================

/// Decision thresholds of the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Minimum total score for a directional call, before the regime's
    /// threshold multiplier.
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f64,

    /// |bias| must exceed this fraction of the theoretical maximum.
    #[serde(default = "default_min_bias_fraction")]
    pub min_bias_fraction: f64,

    #[serde(default = "default_agreement_floor")]
    pub agreement_floor: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            min_bias_fraction: default_min_bias_fraction(),
            agreement_floor: default_agreement_floor(),
        }
    }
}

// =============================================================================
// RiskParams
// =============================================================================

/// Stop / target sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// ATR multiplier for the baseline stop-loss distance.
    #[serde(default = "default_sl_atr_multiplier")]
    pub sl_atr_multiplier: f64,

    /// ATR multiplier for the baseline take-profit distance.
    #[serde(default = "default_tp_atr_multiplier")]
    pub tp_atr_multiplier: f64,

    /// Hard floor: neither level may sit closer than this to entry (%).
    #[serde(default = "default_min_distance_pct")]
    pub min_distance_pct: f64,

    /// Validator rejects levels whose reward : risk falls below this.
    #[serde(default = "default_min_risk_reward")]
    pub min_risk_reward: f64,

    /// Bars on each side a pivot must dominate.
    #[serde(default = "default_pivot_span")]
    pub pivot_span: usize,

    /// Gap kept between a clamped level and the structure it clamps to (%).
    #[serde(default = "default_level_buffer_pct")]
    pub level_buffer_pct: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            sl_atr_multiplier: default_sl_atr_multiplier(),
            tp_atr_multiplier: default_tp_atr_multiplier(),
            min_distance_pct: default_min_distance_pct(),
            min_risk_reward: default_min_risk_reward(),
            pivot_span: default_pivot_span(),
            level_buffer_pct: default_level_buffer_pct(),
        }
    }
}

// =============================================================================
// OutcomeParams
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeParams {
    /// Gain (%) at which an early exit is considered, subject to
    /// dual-timeframe re-confirmation.
    #[serde(default = "default_early_exit_pct")]
    pub early_exit_pct: f64,

    /// Open records older than this close on TIMEOUT.
    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: i64,
}

impl Default for OutcomeParams {
    fn default() -> Self {
        Self {
            early_exit_pct: default_early_exit_pct(),
            max_hold_hours: default_max_hold_hours(),
        }
    }
}

// =============================================================================
// LearningParams
// =============================================================================

/// Control-loop constants of the weight learner.
///
/// The loss and win paths share one rule table but keep their own ratio
/// thresholds and adjustment caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningParams {
    /// Minimum run of same-outcome signals that counts as a streak.
    #[serde(default = "default_streak_length")]
    pub streak_length: usize,

    /// Most recent LOST / WON records analysed per cycle.
    #[serde(default = "default_analysis_window")]
    pub analysis_window: usize,

    #[serde(default = "default_loss_ratio_threshold")]
    pub loss_ratio_threshold: f64,

    /// Largest relative cut a single loss cycle may apply (0.15 = 15%).
    #[serde(default = "default_loss_max_adjust")]
    pub loss_max_adjust: f64,

    #[serde(default = "default_win_ratio_threshold")]
    pub win_ratio_threshold: f64,

    /// Largest relative boost a single win cycle may apply.
    #[serde(default = "default_win_max_adjust")]
    pub win_max_adjust: f64,

    /// Closed trades without a wrong call before a penalised weight recovers.
    #[serde(default = "default_recovery_after_trades")]
    pub recovery_after_trades: usize,

    /// Fraction of the remaining gap to default closed per recovery step.
    #[serde(default = "default_recovery_rate")]
    pub recovery_rate: f64,

    #[serde(default = "default_min_weight")]
    pub min_weight: f64,

    #[serde(default = "default_max_weight")]
    pub max_weight: f64,

    /// Adjustments smaller than this are not applied.
    #[serde(default = "default_materiality_floor")]
    pub materiality_floor: f64,

    /// Upper bound on records examined by one streak scan.
    #[serde(default = "default_max_scan")]
    pub max_scan: usize,

    /// Upper bound on streak cycles processed by one pending-cycles run.
    #[serde(default = "default_max_cycles_per_run")]
    pub max_cycles_per_run: usize,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            streak_length: default_streak_length(),
            analysis_window: default_analysis_window(),
            loss_ratio_threshold: default_loss_ratio_threshold(),
            loss_max_adjust: default_loss_max_adjust(),
            win_ratio_threshold: default_win_ratio_threshold(),
            win_max_adjust: default_win_max_adjust(),
            recovery_after_trades: default_recovery_after_trades(),
            recovery_rate: default_recovery_rate(),
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
            materiality_floor: default_materiality_floor(),
            max_scan: default_max_scan(),
            max_cycles_per_run: default_max_cycles_per_run(),
        }
    }
}

// =============================================================================
// RunnerSettings
// =============================================================================

/// Settings of the polling loop in the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_coins")]
    pub coins: Vec<String>,

    /// Asset whose bars drive the market regime.
    #[serde(default = "default_reference_coin")]
    pub reference_coin: String,

    /// Scoring interval.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Faster of the two re-confirmation timeframes; the slower one is
    /// `interval`.
    #[serde(default = "default_fast_interval")]
    pub fast_interval: String,

    #[serde(default = "default_bar_count")]
    pub bar_count: usize,

    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            coins: default_coins(),
            reference_coin: default_reference_coin(),
            interval: default_interval(),
            fast_interval: default_fast_interval(),
            bar_count: default_bar_count(),
            poll_secs: default_poll_secs(),
            store_path: default_store_path(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration. Every section defaults independently, so `{}`
/// is a valid config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringParams,

    #[serde(default)]
    pub risk: RiskParams,

    #[serde(default)]
    pub outcome: OutcomeParams,

    #[serde(default)]
    pub learning: LearningParams,

    #[serde(default)]
    pub runner: RunnerSettings,
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            coins = ?config.runner.coins,
            interval = %config.runner.interval,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default engine config");
                Self::default()
            }
        }
    }

    /// Persist the configuration using an atomic write (write to `.tmp`,
    /// then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Apply `ENGINE_COINS` / `ENGINE_STORE` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(coins) = std::env::var("ENGINE_COINS") {
            let parsed = parse_coin_list(&coins);
            if parsed.is_empty() {
                warn!(value = %coins, "ENGINE_COINS is empty, keeping configured coins");
            } else {
                self.runner.coins = parsed;
            }
        }
        if let Ok(store) = std::env::var("ENGINE_STORE") {
            if !store.trim().is_empty() {
                self.runner.store_path = PathBuf::from(store.trim());
            }
        }
    }
}

/// Split a comma list into upper-cased, de-duplicated coin symbols.
pub fn parse_coin_list(raw: &str) -> Vec<String> {
    let mut coins: Vec<String> = Vec::new();
    for coin in raw.split(',').map(|c| c.trim().to_uppercase()) {
        if !coin.is_empty() && !coins.contains(&coin) {
            coins.push(coin);
        }
    }
    coins
}
