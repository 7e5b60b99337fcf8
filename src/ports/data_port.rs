//! Candle data access port trait.

use crate::domain::candle::Candle;
use crate::domain::error::QuantgateError;

pub trait DataPort: Send + Sync {
    /// All candles for a symbol, ordered by timestamp.
    fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>, QuantgateError>;

    /// Symbols with data available, sorted.
    fn list_symbols(&self) -> Result<Vec<String>, QuantgateError>;
}
