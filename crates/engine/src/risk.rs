//! Stop-loss / take-profit placement at a fixed 3:1 reward:risk

use crate::types::Action;
use serde::{Deserialize, Serialize};

/// Minimum stop distance in price units (8 pips on a 4-digit quote).
/// Not rescaled for JPY or crypto prices.
pub const MIN_STOP_DISTANCE: f64 = 0.0008;

pub const REWARD_RISK_RATIO: f64 = 3.0;

/// Confidence attached to every emitted signal, in percent
pub const SIGNAL_CONFIDENCE: u8 = 98;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// `max(atr / 2, MIN_STOP_DISTANCE)`
pub fn stop_distance(atr: f64) -> f64 {
    (atr / 2.0).max(MIN_STOP_DISTANCE)
}

pub fn take_distance(atr: f64) -> f64 {
    stop_distance(atr) * REWARD_RISK_RATIO
}

/// Place stop-loss and take-profit around `entry` for the given direction.
pub fn levels(action: Action, entry: f64, atr: f64) -> RiskLevels {
    let stop = stop_distance(atr);
    let take = take_distance(atr);
    match action {
        Action::Buy => RiskLevels {
            stop_loss: entry - stop,
            take_profit: entry + take,
        },
        Action::Sell => RiskLevels {
            stop_loss: entry + stop,
            take_profit: entry - take,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_stop_distance_floor() {
        // ATR/2 = 0.0005 < floor
        assert_eq!(stop_distance(0.0010), MIN_STOP_DISTANCE);
        assert_eq!(stop_distance(0.0), 0.0008);
    }

    #[test]
    fn test_stop_distance_above_floor() {
        assert!((stop_distance(0.0030) - 0.0015).abs() < EPS);
    }

    #[test]
    fn test_take_is_three_times_stop() {
        for atr in [0.0, 0.0004, 0.0016, 0.0042, 1.5] {
            let ratio = take_distance(atr) / stop_distance(atr);
            assert!((ratio - 3.0).abs() < EPS, "atr {}: ratio {}", atr, ratio);
        }
    }

    #[test]
    fn test_buy_levels_ordering() {
        let entry = 1.0850;
        let l = levels(Action::Buy, entry, 0.0024);
        assert!(l.stop_loss < entry && entry < l.take_profit);
        let risk = entry - l.stop_loss;
        let reward = l.take_profit - entry;
        assert!((reward - 3.0 * risk).abs() < 1e-9);
        assert!((risk - 0.0012).abs() < 1e-9);
    }

    #[test]
    fn test_sell_levels_ordering() {
        let entry = 1.2530;
        let l = levels(Action::Sell, entry, 0.0004);
        assert!(l.take_profit < entry && entry < l.stop_loss);
        let risk = l.stop_loss - entry;
        let reward = entry - l.take_profit;
        assert!((reward - 3.0 * risk).abs() < 1e-9);
        assert!((risk - MIN_STOP_DISTANCE).abs() < 1e-9);
    }
}
