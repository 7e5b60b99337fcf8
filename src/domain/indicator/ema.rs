//! Exponential moving average of closes.
//!
//! k = 2/(n+1), seeded with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). First (n-1) bars are warm-up.

use super::IndicatorSeries;
use crate::domain::candle::Candle;

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return vec![None; candles.len()];
    }

    let mut values = Vec::with_capacity(candles.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        if i < period - 1 {
            sum += candle.close;
            values.push(None);
        } else if i == period - 1 {
            sum += candle.close;
            ema = sum / period as f64;
            values.push(Some(ema));
        } else {
            ema = candle.close * k + ema * (1.0 - k);
            values.push(Some(ema));
        }
    }

    values
}
