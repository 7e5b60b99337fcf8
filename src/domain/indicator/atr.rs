//! Average true range with Wilder smoothing, seeded with the SMA of the first
//! n true ranges. The first bar's true range is high - low.

use super::IndicatorSeries;
use crate::domain::candle::Candle;

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    let mut values = vec![None; candles.len()];
    if period == 0 || candles.len() < period {
        return values;
    }

    let tr: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    values[period - 1] = Some(atr);

    for i in period..candles.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        values[i] = Some(atr);
    }

    values
}
