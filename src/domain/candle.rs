//! OHLCV candle representation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.high >= self.low
            && self.volume.is_finite()
    }
}

/// Check ordering and shape of a candle table before it reaches a strategy.
pub fn validate_candles(candles: &[Candle]) -> Result<(), String> {
    if candles.is_empty() {
        return Err("no candles".into());
    }
    if let Some(i) = candles.iter().position(|c| !c.is_well_formed()) {
        return Err(format!("malformed candle at row {i}"));
    }
    if let Some(i) = candles
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        return Err(format!("timestamps decrease at row {}", i + 1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_candle() -> Candle {
        Candle {
            timestamp: ts(0),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn true_range_hl_dominates() {
        let c = sample_candle();
        assert!((c.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let c = sample_candle();
        // |110-70| = 40
        assert!((c.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let c = sample_candle();
        assert!((c.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(validate_candles(&[]).is_err());
    }

    #[test]
    fn validate_rejects_inverted_bar() {
        let mut c = sample_candle();
        c.high = 80.0;
        let err = validate_candles(&[c]).unwrap_err();
        assert!(err.contains("row 0"));
    }

    #[test]
    fn validate_rejects_decreasing_timestamps() {
        let a = Candle {
            timestamp: ts(2),
            ..sample_candle()
        };
        let b = Candle {
            timestamp: ts(1),
            ..sample_candle()
        };
        let err = validate_candles(&[a, b]).unwrap_err();
        assert!(err.contains("row 1"));
    }

    #[test]
    fn validate_accepts_equal_timestamps() {
        let a = sample_candle();
        let b = sample_candle();
        assert!(validate_candles(&[a, b]).is_ok());
    }
}
