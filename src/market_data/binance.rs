// =============================================================================
// Binance USDT-M Futures provider (public endpoints only)
// =============================================================================
//
// Endpoints:
//   GET /fapi/v1/klines            bars (array-of-arrays)
//   GET /fapi/v1/premiumIndex      mark / index price + last funding rate
//   GET /fapi/v1/openInterest      current open interest
//   GET /futures/data/openInterestHist   hourly OI, 24h back
//   GET /fapi/v1/ticker/24hr       24h quote volume
//   GET /fapi/v1/klines (1d)       daily quote volume baseline
// Fear & Greed comes from alternative.me.
//
// Every positioning piece is optional; only a failed premiumIndex call makes
// the whole context unavailable.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::indicators::PositioningContext;
use crate::market_data::MarketDataProvider;
use crate::types::Bar;

const FAPI_URL: &str = "https://fapi.binance.com";
const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/?limit=1";

/// Days of daily volume averaged into the 24h volume baseline.
const VOLUME_BASELINE_DAYS: usize = 7;

#[derive(Clone)]
pub struct BinanceFuturesProvider {
    client: reqwest::Client,
    base_url: String,
    fear_greed_url: String,
}

impl BinanceFuturesProvider {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client for BinanceFuturesProvider")?;
        Ok(Self::with_client(client))
    }

    /// Re-use an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: FAPI_URL.to_string(),
            fear_greed_url: FEAR_GREED_URL.to_string(),
        }
    }

    /// "BTC" → "BTCUSDT"; already-quoted symbols pass through.
    pub fn symbol(coin: &str) -> String {
        let coin = coin.trim().to_uppercase();
        if coin.ends_with("USDT") {
            coin
        } else {
            format!("{coin}USDT")
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} request failed"))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse response of {url}"))?;

        if !status.is_success() {
            anyhow::bail!("GET {} returned {}: {}", url, status, body);
        }
        Ok(body)
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Bar>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.clamp(1, 1500)
        );
        parse_klines(&self.get_json(&url).await?)
    }

    async fn open_interest_24h_ago(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/futures/data/openInterestHist?symbol={}&period=1h&limit=25",
            self.base_url, symbol
        );
        let body = self.get_json(&url).await?;
        Ok(body
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| str_f64(&row["sumOpenInterest"])))
    }

    async fn volume_baseline(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval=1d&limit={}",
            self.base_url,
            symbol,
            VOLUME_BASELINE_DAYS + 1
        );
        Ok(daily_quote_volume_baseline(&self.get_json(&url).await?))
    }
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesProvider {
    #[instrument(skip(self), name = "binance::fetch_bars")]
    async fn fetch_bars(&self, coin: &str, interval: &str, count: usize) -> Result<Vec<Bar>> {
        let symbol = Self::symbol(coin);
        let bars = self.klines(&symbol, interval, count).await?;
        debug!(symbol = %symbol, interval, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    async fn fetch_sentiment_index(&self) -> Option<i64> {
        match self.get_json(&self.fear_greed_url).await {
            Ok(body) => {
                let value = parse_fear_greed(&body);
                if value.is_none() {
                    warn!("Fear & Greed response malformed, sentiment neutral");
                }
                value
            }
            Err(e) => {
                warn!(error = %e, "Fear & Greed unavailable, sentiment neutral");
                None
            }
        }
    }

    async fn fetch_positioning_context(&self, coin: &str) -> Option<PositioningContext> {
        let symbol = Self::symbol(coin);

        let premium_url = format!("{}/fapi/v1/premiumIndex?symbol={}", self.base_url, symbol);
        let (funding_rate, premium) = match self.get_json(&premium_url).await.map(|b| parse_premium_index(&b)) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                warn!(symbol = %symbol, "premiumIndex response malformed, positioning neutral");
                return None;
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "premiumIndex unavailable, positioning neutral");
                return None;
            }
        };

        // A missing current reading voids the matching baseline, so the
        // derived ratio goes neutral instead of reading as a collapse.
        let oi_url = format!("{}/fapi/v1/openInterest?symbol={}", self.base_url, symbol);
        let open_interest = match self.get_json(&oi_url).await {
            Ok(body) => str_f64(&body["openInterest"]),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "open interest unavailable");
                None
            }
        };
        let open_interest_prev = match open_interest {
            Some(_) => self.open_interest_24h_ago(&symbol).await.unwrap_or_else(|e| {
                warn!(symbol = %symbol, error = %e, "open interest history unavailable");
                None
            }),
            None => None,
        };

        let ticker_url = format!("{}/fapi/v1/ticker/24hr?symbol={}", self.base_url, symbol);
        let volume_24h = match self.get_json(&ticker_url).await {
            Ok(body) => str_f64(&body["quoteVolume"]),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "24h ticker unavailable");
                None
            }
        };
        let volume_24h_avg = match volume_24h {
            Some(_) => self.volume_baseline(&symbol).await.unwrap_or_else(|e| {
                warn!(symbol = %symbol, error = %e, "daily volume baseline unavailable");
                None
            }),
            None => None,
        };

        let ctx = PositioningContext {
            funding_rate,
            open_interest: open_interest.unwrap_or(0.0),
            open_interest_prev,
            volume_24h: volume_24h.unwrap_or(0.0),
            volume_24h_avg,
            premium,
        };
        debug!(
            symbol = %symbol,
            funding_pct = format!("{:.4}", ctx.funding_rate_pct()),
            premium_pct = format!("{:.4}", ctx.premium_pct()),
            oi_change_pct = ?ctx.oi_change_pct(),
            volume_ratio = ?ctx.volume_ratio(),
            "positioning context fetched"
        );
        Some(ctx)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

/// Binance returns most numbers as strings.
fn str_f64(v: &Value) -> Option<f64> {
    let parsed: Option<f64> = match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

/// Kline rows: [openTime, open, high, low, close, volume, closeTime,
/// quoteVolume, ...]. Malformed rows are skipped with a warning.
pub fn parse_klines(body: &Value) -> Result<Vec<Bar>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut bars = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some(arr) = entry.as_array().filter(|a| a.len() >= 6) else {
            warn!("skipping malformed kline entry");
            continue;
        };
        let timestamp = arr[0].as_i64().and_then(DateTime::<Utc>::from_timestamp_millis);
        let fields = (
            str_f64(&arr[1]),
            str_f64(&arr[2]),
            str_f64(&arr[3]),
            str_f64(&arr[4]),
            str_f64(&arr[5]),
            timestamp,
        );
        match fields {
            (Some(open), Some(high), Some(low), Some(close), Some(volume), Some(ts)) => {
                bars.push(Bar::new(open, high, low, close, volume, ts));
            }
            _ => warn!("skipping kline entry with unparsable fields"),
        }
    }
    Ok(bars)
}

/// (last funding rate, (mark - index) / index).
pub fn parse_premium_index(body: &Value) -> Option<(f64, f64)> {
    let funding = str_f64(&body["lastFundingRate"])?;
    let mark = str_f64(&body["markPrice"])?;
    let index = str_f64(&body["indexPrice"])?;
    if index <= 0.0 {
        return None;
    }
    Some((funding, (mark - index) / index))
}

/// Average quote volume of the completed days; the last row is today.
pub fn daily_quote_volume_baseline(body: &Value) -> Option<f64> {
    let rows = body.as_array()?;
    if rows.len() < 2 {
        return None;
    }
    let volumes: Vec<f64> = rows[..rows.len() - 1]
        .iter()
        .filter_map(|row| row.as_array().and_then(|a| a.get(7)).and_then(str_f64))
        .collect();
    if volumes.is_empty() {
        return None;
    }
    Some(volumes.iter().sum::<f64>() / volumes.len() as f64)
}

/// `{"data":[{"value":"54", ...}]}` → 54, rejected outside 0..=100.
pub fn parse_fear_greed(body: &Value) -> Option<i64> {
    let value = &body["data"][0]["value"];
    let parsed = match value {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }?;
    (0..=100).contains(&parsed).then_some(parsed)
}
