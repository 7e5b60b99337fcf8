//! Technical indicators used by rule strategies.
//!
//! Every series has one slot per candle. A `None` slot is a warm-up bar where
//! the indicator is not yet defined.

pub mod atr;
pub mod ema;
pub mod rsi;
pub mod sma;

use std::fmt;

use super::candle::Candle;

/// One value per candle; `None` during warm-up.
pub type IndicatorSeries = Vec<Option<f64>>;

/// Indicator identity and period. Serves as the cache key for computed series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
}

impl IndicatorKind {
    pub fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        match self {
            IndicatorKind::Sma(n) => sma::calculate_sma(candles, *n),
            IndicatorKind::Ema(n) => ema::calculate_ema(candles, *n),
            IndicatorKind::Rsi(n) => rsi::calculate_rsi(candles, *n),
            IndicatorKind::Atr(n) => atr::calculate_atr(candles, *n),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(period) => write!(f, "SMA({})", period),
            IndicatorKind::Ema(period) => write!(f, "EMA({})", period),
            IndicatorKind::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorKind::Atr(period) => write!(f, "ATR({})", period),
        }
    }
}
