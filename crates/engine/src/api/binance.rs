//! Binance public API client for market data (no authentication required)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::CandleSource;
use crate::types::Candle;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_INTERVAL: &str = "5m";
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    interval: String,
}

/// Raw kline data from Binance API (array of arrays)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

impl RawKline {
    fn into_candle(self) -> Option<Candle> {
        Some(Candle {
            timestamp: self.0,
            open: self.1.parse().ok()?,
            high: self.2.parse().ok()?,
            low: self.3.parse().ok()?,
            close: self.4.parse().ok()?,
            tick_volume: self.8,
            spread: 0,
            real_volume: self.5.parse::<f64>().ok()? as u64,
        })
    }
}

/// `BTCUSD` -> `BTCUSDT`; symbols already quoted in USDT pass through.
pub fn market_symbol(symbol: &str) -> String {
    let symbol = symbol.to_uppercase();
    if symbol.ends_with("USD") {
        format!("{}T", symbol)
    } else {
        symbol
    }
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            interval: DEFAULT_INTERVAL.to_string(),
        })
    }

    pub fn with_interval(mut self, interval: &str) -> Self {
        self.interval = interval.to_string();
        self
    }

    /// Fetch the latest `limit` klines for a symbol
    pub async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let pair = market_symbol(symbol);
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, pair, self.interval, limit
        );

        debug!(symbol = %pair, interval = %self.interval, limit, "Fetching klines from Binance");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_klines: Vec<RawKline> = response.json().await?;
        let candles: Vec<Candle> = raw_klines
            .into_iter()
            .filter_map(RawKline::into_candle)
            .collect();

        debug!(count = candles.len(), "Fetched klines");
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>> {
        self.get_klines(symbol, count).await
    }
}
