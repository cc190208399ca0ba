//! Synthetic forex candles
//!
//! Base price + drifting random walk + two sine cycles + noise, with wicks
//! drawn around each close. Seeded per symbol so a given (seed, symbol)
//! always produces the same shape.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use sha2::{Digest, Sha256};

use super::CandleSource;
use crate::format::InstrumentKind;
use crate::types::Candle;

const TREND_STEP_SD: f64 = 0.0001;
const NOISE_SD: f64 = 0.0003;
const CYCLE_SPAN: f64 = 10.0;

/// Typical wick size; yen pairs trade at roughly 100x the price level
const WICK: f64 = 0.0002;
const WICK_JPY: f64 = 0.02;

pub fn base_price(symbol: &str) -> f64 {
    match symbol.to_uppercase().as_str() {
        "EURUSD" => 1.08,
        "GBPUSD" => 1.25,
        "USDJPY" => 154.50,
        "AUDUSD" => 0.65,
        "USDCAD" => 1.37,
        "USDCHF" => 0.91,
        "NZDUSD" => 0.59,
        _ => 1.0,
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    interval_minutes: i64,
}

impl SyntheticSource {
    pub fn new(seed: u64, interval_minutes: i64) -> Self {
        Self {
            seed,
            interval_minutes: interval_minutes.max(1),
        }
    }

    fn rng_for(&self, symbol: &str) -> StdRng {
        let digest = Sha256::digest(symbol.to_uppercase().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(bytes) ^ self.seed)
    }

    /// `count` candles, the last one stamped at `end`.
    pub fn generate(
        &self,
        symbol: &str,
        count: usize,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut rng = self.rng_for(symbol);
        let wick = match InstrumentKind::of(symbol) {
            InstrumentKind::Jpy => WICK_JPY,
            _ => WICK,
        };
        let base = base_price(symbol);

        let trend_step = Normal::new(0.0, TREND_STEP_SD)?;
        let noise = Normal::new(0.0, NOISE_SD)?;
        let wick_size = Normal::new(wick, 2.0 * wick)?;

        let mut trend = 0.0;
        let closes: Vec<f64> = (0..count)
            .map(|i| {
                trend += trend_step.sample(&mut rng);
                let t = if count > 1 {
                    CYCLE_SPAN * i as f64 / (count - 1) as f64
                } else {
                    0.0
                };
                let cycle = 0.001 * t.sin() + 0.0005 * (3.0 * t).sin();
                base + trend + cycle + noise.sample(&mut rng)
            })
            .collect();

        let step = Duration::minutes(self.interval_minutes);
        let end_ms = end.timestamp_millis();

        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                let high = close + wick_size.sample(&mut rng).abs();
                let low = close - wick_size.sample(&mut rng).abs();
                let back = (count - 1 - i) as i64;
                Candle {
                    timestamp: end_ms - step.num_milliseconds() * back,
                    open,
                    high: high.max(open).max(close),
                    low: low.min(open).min(close),
                    close,
                    tick_volume: rng.gen_range(100..1000),
                    spread: rng.gen_range(1..5),
                    real_volume: rng.gen_range(1000..10000),
                }
            })
            .collect();
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>> {
        self.generate(symbol, count, Utc::now())
    }
}
