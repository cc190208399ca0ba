//! Display helpers: per-instrument price formatting and the signal card

use crate::types::Signal;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;

/// Marker rendered for a missing price
pub const NOT_AVAILABLE: &str = "N/A";

const CRYPTO_ASSETS: [&str; 5] = ["BTC", "ETH", "SOL", "XRP", "ADA"];

/// Quote convention of an instrument, derived from its symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Yen crosses, quoted to 2 decimals
    Jpy,
    /// Crypto pairs; `bitcoin` pairs get a single decimal
    Crypto { bitcoin: bool },
    /// Everything else, quoted to 5 decimals
    Standard,
}

impl InstrumentKind {
    /// JPY wins over crypto when a symbol mentions both.
    pub fn of(symbol: &str) -> Self {
        let symbol = symbol.to_uppercase();
        if symbol.contains("JPY") {
            InstrumentKind::Jpy
        } else if CRYPTO_ASSETS.iter().any(|asset| symbol.contains(asset)) {
            InstrumentKind::Crypto {
                bitcoin: symbol.contains("BTC"),
            }
        } else {
            InstrumentKind::Standard
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, InstrumentKind::Crypto { .. })
    }

    pub fn price_decimals(&self) -> usize {
        match self {
            InstrumentKind::Jpy => 2,
            InstrumentKind::Crypto { bitcoin: true } => 1,
            InstrumentKind::Crypto { bitcoin: false } => 2,
            InstrumentKind::Standard => 5,
        }
    }

    /// Price units to pips for display (100 for yen, 10000 otherwise).
    /// The classifier keeps its own fixed scale.
    pub fn display_pip_factor(&self) -> f64 {
        match self {
            InstrumentKind::Jpy => 100.0,
            _ => 10_000.0,
        }
    }
}

/// Render a price the way the instrument is quoted.
pub fn format_price(price: Option<f64>, symbol: &str) -> String {
    match price {
        Some(p) if p.is_finite() => {
            let decimals = InstrumentKind::of(symbol).price_decimals();
            round_quoted(p, decimals)
        }
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Round the shortest decimal form of `p` (what a quote shows, 151.805 rather
/// than its binary expansion) half to even.
fn round_quoted(p: f64, decimals: usize) -> String {
    match p.to_string().parse::<Decimal>() {
        Ok(d) => {
            let rounded =
                d.round_dp_with_strategy(decimals as u32, RoundingStrategy::MidpointNearestEven);
            format!("{:.*}", decimals, rounded)
        }
        // Beyond Decimal's range
        Err(_) => format!("{:.*}", decimals, p),
    }
}

/// Risk and reward in display pips, plus their ratio
pub fn risk_reward_summary(signal: &Signal) -> String {
    let factor = InstrumentKind::of(&signal.symbol).display_pip_factor();
    let risk_pips = signal.risk() * factor;
    let reward_pips = signal.reward() * factor;
    let ratio = if risk_pips > 0.0 {
        reward_pips / risk_pips
    } else {
        0.0
    };
    format!(
        "Risk: {:.1} pips | Reward: {:.1} pips | Ratio: {:.1}:1",
        risk_pips, reward_pips, ratio
    )
}

/// Text card for a signal, as shown to the user or copied elsewhere
pub struct SignalCard<'a>(pub &'a Signal);

impl fmt::Display for SignalCard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        writeln!(f, "SIGNAL FOR: {}", s.symbol)?;
        writeln!(f, "DIRECTION: {}", s.action)?;
        writeln!(f, "ENTRY: {}", format_price(Some(s.entry), &s.symbol))?;
        writeln!(f, "STOP-LOSS: {}", format_price(Some(s.stop_loss), &s.symbol))?;
        writeln!(f, "TAKE-PROFIT: {}", format_price(Some(s.take_profit), &s.symbol))?;
        writeln!(f, "CONFIDENCE: {}%", s.confidence)?;
        write!(f, "VALID UNTIL: {}", s.expires_at.format("%H:%M UTC"))
    }
}
