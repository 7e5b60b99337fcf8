//! Strategy output shapes: per-bar signals or a pre-computed metrics map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    EnterLong,
    ExitLong,
    Hold,
}

/// Candles with one signal slot per bar.
///
/// A `None` signal marks a warm-up bar whose indicators are undefined; the
/// simulator skips those bars entirely. `atr` carries the volatility value used
/// to place bracket levels when a position is opened on that bar.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTable {
    pub candles: Vec<Candle>,
    pub signals: Vec<Option<Signal>>,
    pub atr: Vec<Option<f64>>,
}

impl SignalTable {
    pub fn new(candles: Vec<Candle>, signals: Vec<Option<Signal>>) -> Self {
        let atr = vec![None; candles.len()];
        Self {
            candles,
            signals,
            atr,
        }
    }

    pub fn with_atr(mut self, atr: Vec<Option<f64>>) -> Self {
        self.atr = atr;
        self
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Count of bars carrying a defined signal.
    pub fn processed_bars(&self) -> usize {
        self.signals.iter().filter(|s| s.is_some()).count()
    }
}

/// A pre-computed result in any of the historical field-naming conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetrics(pub Map<String, Value>);

impl RawMetrics {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert a number. JSON has no infinity, so non-finite values are
    /// stored as `"inf"`, `"-inf"` or `"NaN"` strings, which
    /// [`number`](Self::number) reads back.
    pub fn with_number(self, key: &str, value: f64) -> Self {
        if value.is_finite() {
            self.with(key, value)
        } else {
            self.with(key, value.to_string())
        }
    }

    /// Numeric value of a key; numeric strings are accepted, null and other
    /// types are treated as absent.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Tagged union of what a strategy may return.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutput {
    RawMetrics(RawMetrics),
    SignalTable(SignalTable),
}
