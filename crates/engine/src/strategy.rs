//! Signal pipeline: candles -> indicators -> classifier -> risk -> `Signal`

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::classifier::{self, Rejection};
use crate::indicators;
use crate::risk::{self, SIGNAL_CONFIDENCE};
use crate::types::{validate_candles, Candle, EnrichedCandle, IndicatorSnapshot, Signal};

/// How long an emitted signal stays valid
pub const DEFAULT_VALIDITY_HOURS: i64 = 2;

/// Stateless pipeline. Safe to share between tasks and to call repeatedly.
#[derive(Debug, Clone, Copy)]
pub struct SignalEngine {
    validity: Duration,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_VALIDITY_HOURS))
    }
}

impl SignalEngine {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Run the full pipeline on a candle sequence.
    ///
    /// Any rejection (short input, undefined indicator, unmet condition,
    /// malformed candles) is `None`.
    pub fn evaluate(&self, symbol: &str, candles: &[Candle], now: DateTime<Utc>) -> Option<Signal> {
        match self.explain(symbol, candles, now) {
            Ok(signal) => Some(signal),
            Err(reason) => {
                debug!(symbol, %reason, "No signal");
                None
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but reports why nothing was emitted.
    pub fn explain(
        &self,
        symbol: &str,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<Signal, Rejection> {
        validate_candles(candles)?;
        let enriched = indicators::enrich(candles);
        self.decide(symbol, &enriched, now)
    }

    /// Classify an already enriched sequence and assemble the signal.
    pub fn decide(
        &self,
        symbol: &str,
        enriched: &[EnrichedCandle],
        now: DateTime<Utc>,
    ) -> Result<Signal, Rejection> {
        let action = classifier::explain(enriched)?;
        let current = enriched
            .last()
            .ok_or(Rejection::InsufficientData { have: 0, need: classifier::MIN_CANDLES })?;
        let indicators = snapshot(current)?;

        let entry = current.candle.close;
        let levels = risk::levels(action, entry, indicators.atr);

        debug!(
            symbol,
            action = %action,
            entry,
            stop_loss = levels.stop_loss,
            take_profit = levels.take_profit,
            adx = indicators.adx,
            rsi = indicators.rsi,
            "Signal conditions met"
        );

        Ok(Signal {
            symbol: symbol.to_string(),
            action,
            entry,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            confidence: SIGNAL_CONFIDENCE,
            created_at: now,
            expires_at: now + self.validity,
            candle_time: current.candle.timestamp,
            indicators,
        })
    }
}

fn snapshot(e: &EnrichedCandle) -> Result<IndicatorSnapshot, Rejection> {
    let get = |v: Option<f64>, name| v.ok_or(Rejection::UndefinedIndicator(name));
    Ok(IndicatorSnapshot {
        ema10: get(e.ema10, "ema10")?,
        ema50: get(e.ema50, "ema50")?,
        atr: get(e.atr, "atr")?,
        adx: get(e.adx, "adx")?,
        rsi: get(e.rsi, "rsi")?,
    })
}
