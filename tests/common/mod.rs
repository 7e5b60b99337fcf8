#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quantgate::adapters::file_config_adapter::FileConfigAdapter;
pub use quantgate::domain::candle::Candle;
use quantgate::domain::error::QuantgateError;
use quantgate::domain::strategy::{Strategy, build_strategy};
use quantgate::ports::data_port::DataPort;
use quantgate::ports::strategy_port::{DeploymentStore, StrategyLoader};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>, QuantgateError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantgateError::Data {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        self.data
            .get(symbol)
            .cloned()
            .ok_or_else(|| QuantgateError::Data {
                symbol: symbol.to_string(),
                reason: "no candles".into(),
            })
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantgateError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// In-memory deployments. Also a loader that parses INI documents.
#[derive(Default)]
pub struct MemoryStore {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_snapshot: AtomicBool,
    pub fail_restore: AtomicBool,
    pub restores: Mutex<usize>,
}

impl MemoryStore {
    pub fn with(self, name: &str, code: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), code.as_bytes().to_vec());
        self
    }

    pub fn bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    /// Replace the deployed bytes without going through `restore`.
    pub fn overwrite(&self, name: &str, code: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), code.as_bytes().to_vec());
    }
}

pub fn load_ini(name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError> {
    let config = FileConfigAdapter::from_string(code).map_err(|reason| QuantgateError::ConfigParse {
        file: name.to_string(),
        reason,
    })?;
    build_strategy(name, &config)
}

impl StrategyLoader for MemoryStore {
    fn load(&self, name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError> {
        load_ini(name, code)
    }
}

impl DeploymentStore for MemoryStore {
    fn snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, QuantgateError> {
        if self.fail_snapshot.load(Ordering::Relaxed) {
            return Err(std::io::Error::other("store offline").into());
        }
        Ok(self.bytes(name))
    }

    fn restore(&self, name: &str, snapshot: Option<&[u8]>) -> Result<(), QuantgateError> {
        if self.fail_restore.load(Ordering::Relaxed) {
            return Err(std::io::Error::other("read-only filesystem").into());
        }
        *self.restores.lock().unwrap() += 1;
        let mut files = self.files.lock().unwrap();
        match snapshot {
            Some(bytes) => files.insert(name.to_string(), bytes.to_vec()),
            None => files.remove(name),
        };
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, QuantgateError> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// A loader that deploys whatever it loads, the way a file-swapping runner
/// would.
pub struct OverwritingLoader {
    pub store: Arc<MemoryStore>,
}

impl StrategyLoader for OverwritingLoader {
    fn load(&self, name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError> {
        self.store.overwrite(name, code);
        load_ini(name, code)
    }
}

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: start_time() + Duration::minutes(15 * i as i64),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Candles whose OHLC all equal the given close.
pub fn closes(values: &[f64]) -> Vec<Candle> {
    values
        .iter()
        .enumerate()
        .map(|(i, c)| make_candle(i, *c, *c, *c, *c))
        .collect()
}

/// Repeating rise/fall waves around `base`, `waves` times `2 * leg` bars.
pub fn generate_waves(base: f64, leg: usize, waves: usize, step: f64) -> Vec<Candle> {
    let mut price = base;
    let mut out = Vec::with_capacity(2 * leg * waves);
    for i in 0..2 * leg * waves {
        let rising = (i / leg) % 2 == 0;
        let open = price;
        price += if rising { step } else { -step };
        out.push(make_candle(
            i,
            open,
            open.max(price) + step * 0.25,
            open.min(price) - step * 0.25,
            price,
        ));
    }
    out
}

/// A `[metrics]` document with a pre-computed result.
pub fn metrics_doc(final_equity: f64, win_rate: f64, max_drawdown: f64, trades: usize) -> String {
    format!(
        "[metrics]\nfinal_equity = {final_equity}\nwin_rate = {win_rate}\n\
         max_drawdown = {max_drawdown}\nn_trades = {trades}\n"
    )
}

pub const TREND_DOC: &str = "[strategy]\nname = trend\n\
    entry_long = CROSS_ABOVE(close, SMA(3))\n\
    exit_long = CROSS_BELOW(close, SMA(3))\n";
