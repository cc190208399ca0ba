//! Candle sources: synthetic forex feed and Binance public klines

pub mod binance;
pub mod synthetic;

pub use binance::BinanceClient;
pub use synthetic::SyntheticSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::format::InstrumentKind;
use crate::types::Candle;

/// Anything that can hand back the most recent `count` candles of a symbol,
/// oldest first.
#[async_trait]
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the feed that actually serves `symbol`
    fn source_for(&self, _symbol: &str) -> &str {
        self.name()
    }

    async fn fetch_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>>;
}

/// Crypto symbols go to Binance, everything else to the synthetic feed
pub struct RoutedSource {
    crypto: BinanceClient,
    forex: SyntheticSource,
}

impl RoutedSource {
    pub fn new(crypto: BinanceClient, forex: SyntheticSource) -> Self {
        Self { crypto, forex }
    }

    fn route(&self, symbol: &str) -> &dyn CandleSource {
        if InstrumentKind::of(symbol).is_crypto() {
            &self.crypto
        } else {
            &self.forex
        }
    }
}

#[async_trait]
impl CandleSource for RoutedSource {
    fn name(&self) -> &str {
        "routed"
    }

    fn source_for(&self, symbol: &str) -> &str {
        self.route(symbol).name()
    }

    async fn fetch_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>> {
        self.route(symbol).fetch_candles(symbol, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing() {
        let source = RoutedSource::new(
            BinanceClient::new().unwrap(),
            SyntheticSource::new(42, 5),
        );
        assert_eq!(source.route("BTCUSD").name(), "binance");
        assert_eq!(source.route("ethusd").name(), "binance");
        assert_eq!(source.route("EURUSD").name(), "synthetic");
        assert_eq!(source.route("USDJPY").name(), "synthetic");
    }

    #[test]
    fn test_source_for_names_routed_feed() {
        let source = RoutedSource::new(
            BinanceClient::new().unwrap(),
            SyntheticSource::new(42, 5),
        );
        assert_eq!(source.source_for("BTCUSD"), "binance");
        assert_eq!(source.source_for("EURUSD"), "synthetic");
        assert_eq!(source.name(), "routed");

        let synthetic = SyntheticSource::new(42, 5);
        assert_eq!(synthetic.source_for("EURUSD"), synthetic.name());
    }

    #[tokio::test]
    async fn test_forex_symbols_served_offline() {
        let source = RoutedSource::new(
            BinanceClient::new().unwrap(),
            SyntheticSource::new(42, 5),
        );
        let candles = source.fetch_candles("GBPUSD", 120).await.unwrap();
        assert_eq!(candles.len(), 120);
    }
}
