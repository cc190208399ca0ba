//! Indicator engine
//!
//! Turns a candle sequence into a same-length sequence of [`EnrichedCandle`]s
//! carrying EMA(10), EMA(50), True Range, ATR(14), directional movement,
//! +DI/-DI, DX, ADX(14) and RSI(7). Every value at index `i` depends only on
//! candles `0..=i`. Values whose window has not filled yet are `None`.

use crate::types::{Candle, EnrichedCandle};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;

pub const FAST_EMA_SPAN: usize = 10;
pub const SLOW_EMA_SPAN: usize = 50;
pub const ATR_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;
pub const RSI_PERIOD: usize = 7;

/// Denominator used for RS when the average loss is exactly zero
pub const RSI_ZERO_LOSS_DENOMINATOR: f64 = 0.00001;

// ============================================================================
// Series helpers
// ============================================================================

/// EMA over `values` with `alpha = 2 / (span + 1)`, seeded with the first value.
///
/// Returns an empty vector for `span == 0`.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let mut ema = match ExponentialMovingAverage::new(span) {
        Ok(ema) => ema,
        Err(_) => return Vec::new(),
    };
    values.iter().map(|&v| ema.next(v)).collect()
}

/// Simple rolling mean over the last `period` entries.
///
/// An output is defined only when every entry of its window is defined.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let mut sum = 0.0;
            for v in &values[i + 1 - period..=i] {
                sum += (*v)?;
            }
            Some(sum / period as f64)
        })
        .collect()
}

/// True Range for each candle. Index 0 has no previous close and is `None`.
pub fn true_range_series(candles: &[Candle]) -> Vec<Option<f64>> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let prev_close = candles.get(i.checked_sub(1)?)?.close;
            let high_low = c.high - c.low;
            let high_close = (c.high - prev_close).abs();
            let low_close = (c.low - prev_close).abs();
            Some(high_low.max(high_close).max(low_close))
        })
        .collect()
}

/// +DM and -DM for each candle.
///
/// At most one of the two is non-zero. Index 0 has no previous candle, both
/// comparisons fail there, so both values are 0.
pub fn directional_movement(candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
    let mut plus_dm = Vec::with_capacity(candles.len());
    let mut minus_dm = Vec::with_capacity(candles.len());

    for (i, c) in candles.iter().enumerate() {
        if i == 0 {
            plus_dm.push(0.0);
            minus_dm.push(0.0);
            continue;
        }
        let prev = &candles[i - 1];
        let up_move = c.high - prev.high;
        let down_move = prev.low - c.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    (plus_dm, minus_dm)
}

/// `100 * mean_dm / atr`, undefined when either side is missing or ATR is 0
fn directional_index(mean_dm: Option<f64>, atr: Option<f64>) -> Option<f64> {
    let atr = atr.filter(|a| *a != 0.0)?;
    Some(100.0 * (mean_dm? / atr))
}

fn dx_value(plus_di: Option<f64>, minus_di: Option<f64>) -> Option<f64> {
    let (plus, minus) = (plus_di?, minus_di?);
    let sum = plus + minus;
    if sum == 0.0 {
        return None;
    }
    Some(100.0 * (plus - minus).abs() / sum)
}

/// RS with the zero-loss substitution
pub fn relative_strength(avg_gain: f64, avg_loss: f64) -> f64 {
    let denominator = if avg_loss == 0.0 {
        RSI_ZERO_LOSS_DENOMINATOR
    } else {
        avg_loss
    };
    avg_gain / denominator
}

pub fn rsi_from_rs(rs: f64) -> f64 {
    100.0 - (100.0 / (1.0 + rs))
}

// ============================================================================
// Enrichment
// ============================================================================

/// Compute every indicator column over `candles`.
///
/// The input is only borrowed; a new sequence is returned with the same
/// length and order.
pub fn enrich(candles: &[Candle]) -> Vec<EnrichedCandle> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let ema10 = ema_series(&closes, FAST_EMA_SPAN);
    let ema50 = ema_series(&closes, SLOW_EMA_SPAN);

    let true_range = true_range_series(candles);
    let atr = rolling_mean(&true_range, ATR_PERIOD);

    let (plus_dm, minus_dm) = directional_movement(candles);
    let defined = |v: &[f64]| v.iter().copied().map(Some).collect::<Vec<_>>();
    let plus_dm_mean = rolling_mean(&defined(&plus_dm), ADX_PERIOD);
    let minus_dm_mean = rolling_mean(&defined(&minus_dm), ADX_PERIOD);

    let plus_di: Vec<Option<f64>> = plus_dm_mean
        .iter()
        .zip(&atr)
        .map(|(m, a)| directional_index(*m, *a))
        .collect();
    let minus_di: Vec<Option<f64>> = minus_dm_mean
        .iter()
        .zip(&atr)
        .map(|(m, a)| directional_index(*m, *a))
        .collect();
    let dx: Vec<Option<f64>> = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| dx_value(*p, *m))
        .collect();
    let adx = rolling_mean(&dx, ADX_PERIOD);

    let price_change: Vec<Option<f64>> = (0..candles.len())
        .map(|i| Some(closes[i] - *closes.get(i.checked_sub(1)?)?))
        .collect();
    let gain: Vec<Option<f64>> = price_change.iter().map(|c| c.map(|c| c.max(0.0))).collect();
    let loss: Vec<Option<f64>> = price_change.iter().map(|c| c.map(|c| (-c).max(0.0))).collect();
    let avg_gain = rolling_mean(&gain, RSI_PERIOD);
    let avg_loss = rolling_mean(&loss, RSI_PERIOD);

    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let rs = match (avg_gain[i], avg_loss[i]) {
                (Some(g), Some(l)) => Some(relative_strength(g, l)),
                _ => None,
            };
            EnrichedCandle {
                candle: *candle,
                ema10: ema10.get(i).copied(),
                ema50: ema50.get(i).copied(),
                true_range: true_range[i],
                atr: atr[i],
                plus_dm: Some(plus_dm[i]),
                minus_dm: Some(minus_dm[i]),
                plus_di: plus_di[i],
                minus_di: minus_di[i],
                dx: dx[i],
                adx: adx[i],
                price_change: price_change[i],
                gain: gain[i],
                loss: loss[i],
                avg_gain: avg_gain[i],
                avg_loss: avg_loss[i],
                rs,
                rsi: rs.map(rsi_from_rs),
            }
        })
        .collect()
}
