//! Signal classifier
//!
//! Looks only at the last two enriched candles and decides BUY, SELL or
//! nothing. Pure and stateless; identical input always gives the same answer.

use crate::indicators::SLOW_EMA_SPAN;
use crate::types::{Action, CandleError, EnrichedCandle};
use thiserror::Error;

/// Slow EMA window plus the two points read for crossover detection
pub const MIN_CANDLES: usize = SLOW_EMA_SPAN + 2;

pub const ADX_THRESHOLD: f64 = 25.0;
pub const MAX_ATR_PIPS: f64 = 15.0;
pub const RSI_LOWER: f64 = 40.0;
pub const RSI_UPPER: f64 = 60.0;

/// ATR to pips, fixed for 4-digit quoting. Applied to every instrument,
/// JPY and crypto included.
pub const PIP_SCALE: f64 = 10_000.0;

/// Why no signal was produced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("invalid candle data: {0}")]
    InvalidCandles(#[from] CandleError),

    #[error("insufficient data: {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("indicator not ready: {0}")]
    UndefinedIndicator(&'static str),

    #[error("no EMA crossover on the last candle")]
    NoCrossover,

    #[error("trend too weak: ADX {adx:.2}")]
    WeakTrend { adx: f64 },

    #[error("volatility too high: ATR {atr_pips:.2} pips")]
    HighVolatility { atr_pips: f64 },

    #[error("RSI {rsi:.2} outside neutral band")]
    MomentumOutOfBand { rsi: f64 },
}

pub fn atr_pips(atr: f64) -> f64 {
    atr * PIP_SCALE
}

fn read(value: Option<f64>, name: &'static str) -> Result<f64, Rejection> {
    value
        .filter(|v| v.is_finite())
        .ok_or(Rejection::UndefinedIndicator(name))
}

/// Decide on the last candle, reporting the first failed condition.
pub fn explain(enriched: &[EnrichedCandle]) -> Result<Action, Rejection> {
    if enriched.len() < MIN_CANDLES {
        return Err(Rejection::InsufficientData {
            have: enriched.len(),
            need: MIN_CANDLES,
        });
    }

    let current = &enriched[enriched.len() - 1];
    let previous = &enriched[enriched.len() - 2];

    let ema10 = read(current.ema10, "ema10")?;
    let ema50 = read(current.ema50, "ema50")?;
    let prev_ema10 = read(previous.ema10, "ema10")?;
    let prev_ema50 = read(previous.ema50, "ema50")?;
    let adx = read(current.adx, "adx")?;
    let atr = read(current.atr, "atr")?;
    let rsi = read(current.rsi, "rsi")?;

    let action = if ema10 > ema50 && prev_ema10 <= prev_ema50 {
        Action::Buy
    } else if ema10 < ema50 && prev_ema10 >= prev_ema50 {
        Action::Sell
    } else {
        return Err(Rejection::NoCrossover);
    };

    if adx <= ADX_THRESHOLD {
        return Err(Rejection::WeakTrend { adx });
    }

    let atr_pips = atr_pips(atr);
    if atr_pips >= MAX_ATR_PIPS {
        return Err(Rejection::HighVolatility { atr_pips });
    }

    if !(rsi > RSI_LOWER && rsi < RSI_UPPER) {
        return Err(Rejection::MomentumOutOfBand { rsi });
    }

    Ok(action)
}

/// BUY, SELL, or `None` when any condition fails
pub fn classify(enriched: &[EnrichedCandle]) -> Option<Action> {
    explain(enriched).ok()
}
