//! Types shared by the indicator pipeline, the classifier and the collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// A single OHLC candle as delivered by a data provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time, Unix milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: u64,
    pub spread: u32,
    pub real_volume: u64,
}

/// A candle plus every derived indicator value.
///
/// Each derived field is `None` until its rolling window has filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCandle {
    pub candle: Candle,
    pub ema10: Option<f64>,
    pub ema50: Option<f64>,
    pub true_range: Option<f64>,
    pub atr: Option<f64>,
    pub plus_dm: Option<f64>,
    pub minus_dm: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
    pub dx: Option<f64>,
    pub adx: Option<f64>,
    pub price_change: Option<f64>,
    pub gain: Option<f64>,
    pub loss: Option<f64>,
    pub avg_gain: Option<f64>,
    pub avg_loss: Option<f64>,
    pub rs: Option<f64>,
    pub rsi: Option<f64>,
}

impl EnrichedCandle {
    /// An enriched candle with nothing computed yet
    pub fn bare(candle: Candle) -> Self {
        Self {
            candle,
            ema10: None,
            ema50: None,
            true_range: None,
            atr: None,
            plus_dm: None,
            minus_dm: None,
            plus_di: None,
            minus_di: None,
            dx: None,
            adx: None,
            price_change: None,
            gain: None,
            loss: None,
            avg_gain: None,
            avg_loss: None,
            rs: None,
            rsi: None,
        }
    }
}

/// Direction of a trade signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator readings at the candle a signal was computed on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema10: f64,
    pub ema50: f64,
    pub atr: f64,
    pub adx: f64,
    pub rsi: f64,
}

/// A trade signal emitted by the pipeline. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: Action,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Percent
    pub confidence: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Timestamp of the candle the decision was made on (Unix ms)
    pub candle_time: i64,
    pub indicators: IndicatorSnapshot,
}

impl Signal {
    /// Distance between entry and stop-loss
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Distance between entry and take-profit
    pub fn reward(&self) -> f64 {
        (self.take_profit - self.entry).abs()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Stable identity of a signal: the same instrument, direction and
    /// source candle always hash to the same value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.symbol.as_bytes());
        hasher.update(self.action.as_str().as_bytes());
        hasher.update(self.candle_time.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Problems with a candle sequence handed in by a provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("timestamps not strictly increasing at index {index} ({previous} -> {current})")]
    NonIncreasingTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("non-finite price at index {index}")]
    NonFinitePrice { index: usize },

    #[error("high below low at index {index}")]
    InvertedRange { index: usize },
}

/// Check the provider contract: increasing timestamps and sane prices.
pub fn validate_candles(candles: &[Candle]) -> Result<(), CandleError> {
    for (index, c) in candles.iter().enumerate() {
        if ![c.open, c.high, c.low, c.close].iter().all(|p| p.is_finite()) {
            return Err(CandleError::NonFinitePrice { index });
        }
        if c.high < c.low {
            return Err(CandleError::InvertedRange { index });
        }
        if index > 0 {
            let previous = candles[index - 1].timestamp;
            if c.timestamp <= previous {
                return Err(CandleError::NonIncreasingTimestamp {
                    index,
                    previous,
                    current: c.timestamp,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_candle(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close + 0.0002,
            low: close - 0.0002,
            close,
            tick_volume: 100,
            spread: 1,
            real_volume: 1000,
        }
    }

    fn make_signal(symbol: &str, action: Action, candle_time: i64) -> Signal {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Signal {
            symbol: symbol.to_string(),
            action,
            entry: 1.1,
            stop_loss: 1.0992,
            take_profit: 1.1024,
            confidence: 98,
            created_at,
            expires_at: created_at + chrono::Duration::hours(2),
            candle_time,
            indicators: IndicatorSnapshot {
                ema10: 1.1,
                ema50: 1.1,
                atr: 0.0009,
                adx: 30.0,
                rsi: 50.0,
            },
        }
    }

    #[test]
    fn test_validate_accepts_increasing_series() {
        let candles: Vec<Candle> = (0..5).map(|i| make_candle(i * 60_000, 1.1)).collect();
        assert!(validate_candles(&candles).is_ok());
        assert!(validate_candles(&[]).is_ok());
    }

    #[test]
    fn test_validate_rejects_repeated_timestamp() {
        let candles = vec![make_candle(0, 1.1), make_candle(60_000, 1.1), make_candle(60_000, 1.1)];
        assert_eq!(
            validate_candles(&candles),
            Err(CandleError::NonIncreasingTimestamp {
                index: 2,
                previous: 60_000,
                current: 60_000
            })
        );
    }

    #[test]
    fn test_validate_rejects_nan_price() {
        let mut bad = make_candle(60_000, 1.1);
        bad.close = f64::NAN;
        let candles = vec![make_candle(0, 1.1), bad];
        assert_eq!(
            validate_candles(&candles),
            Err(CandleError::NonFinitePrice { index: 1 })
        );
    }

    #[test]
    fn test_action_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(Action::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_fingerprint_depends_on_candle_not_prices() {
        let a = make_signal("EURUSD", Action::Buy, 1_000);
        let mut b = make_signal("EURUSD", Action::Buy, 1_000);
        b.entry = 1.2;
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = make_signal("EURUSD", Action::Buy, 2_000);
        let d = make_signal("EURUSD", Action::Sell, 1_000);
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_expiry() {
        let s = make_signal("EURUSD", Action::Buy, 0);
        assert!(!s.is_expired(s.created_at));
        assert!(s.is_expired(s.expires_at));
    }
}
