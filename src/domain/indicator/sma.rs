//! Simple moving average of closes. First (n-1) bars are warm-up.

use super::IndicatorSeries;
use crate::domain::candle::Candle;

pub fn calculate_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return vec![None; candles.len()];
    }

    let mut values = Vec::with_capacity(candles.len());
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        sum += candle.close;
        if i >= period {
            sum -= candles[i - period].close;
        }
        if i + 1 >= period {
            values.push(Some(sum / period as f64));
        } else {
            values.push(None);
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::closes;

    #[test]
    fn sma_warmup_and_values() {
        let series = calculate_sma(&closes(&[10.0, 20.0, 30.0, 40.0]), 3);
        assert_eq!(series[0], None);
        assert_eq!(series[1], None);
        assert!((series[2].unwrap() - 20.0).abs() < f64::EPSILON);
        assert!((series[3].unwrap() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_period_longer_than_data() {
        let series = calculate_sma(&closes(&[10.0, 20.0]), 5);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn sma_period_0() {
        assert_eq!(calculate_sma(&closes(&[10.0]), 0), vec![None]);
    }
}
