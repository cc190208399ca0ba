//! Signal Forge Engine: trend-following entry signals on intraday candles
//!
//! Provides:
//! - EMA / ATR / ADX / RSI enrichment of OHLC candles
//! - Crossover classifier with trend, volatility and momentum filters
//! - Stop-loss / take-profit placement at a fixed 3:1 ratio
//! - Per-instrument price formatting and signal cards
//! - Candle sources (synthetic forex feed, Binance public klines)
//! - Concurrent watchlist scanner with signal history

pub mod api;
pub mod classifier;
pub mod format;
pub mod indicators;
pub mod risk;
pub mod scanner;
pub mod strategy;
pub mod types;

// Re-exports for convenience
pub use api::{BinanceClient, CandleSource, RoutedSource, SyntheticSource};
pub use classifier::{classify, Rejection};
pub use format::{format_price, risk_reward_summary, InstrumentKind, SignalCard};
pub use indicators::enrich;
pub use risk::RiskLevels;
pub use scanner::{
    parse_symbols, run_continuous, save_signals, scan_once, ScanConfig, ScanProgress, ScanReport,
    ScanSnapshot, ScanStatus,
};
pub use strategy::SignalEngine;
pub use types::*;
