//! CSV candle files, one `<SYMBOL>.csv` per symbol under a data directory.

use crate::domain::candle::Candle;
use crate::domain::error::QuantgateError;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const TIMESTAMP_COLUMNS: [&str; 5] = ["timestamp", "open_time", "date", "time", "datetime"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

pub struct CsvAdapter {
    data_dir: PathBuf,
}

impl CsvAdapter {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }
}

fn data_error(symbol: &str, reason: String) -> QuantgateError {
    QuantgateError::Data {
        symbol: symbol.to_string(),
        reason,
    }
}

/// Parse a timestamp cell in any of the accepted forms.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(epoch) = raw.parse::<i64>() {
        let dt = if epoch.abs() >= EPOCH_MILLIS_CUTOFF {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
        return dt.map(|d| d.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, symbol: &str) -> Result<Self, QuantgateError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |wanted: &str| {
            names
                .iter()
                .position(|n| n == wanted)
                .ok_or_else(|| data_error(symbol, format!("missing {} column", wanted)))
        };
        let timestamp = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|c| names.iter().position(|n| n == c))
            .ok_or_else(|| data_error(symbol, "missing timestamp column".into()))?;

        Ok(Columns {
            timestamp,
            open: find("open")?,
            high: find("high")?,
            low: find("low")?,
            close: find("close")?,
            volume: find("volume")?,
        })
    }
}

impl DataPort for CsvAdapter {
    fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>, QuantgateError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(symbol, format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_error(symbol, format!("CSV header error: {}", e)))?
            .clone();
        let cols = Columns::locate(&headers, symbol)?;

        let mut candles = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record =
                result.map_err(|e| data_error(symbol, format!("CSV parse error: {}", e)))?;

            let cell = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .ok_or_else(|| data_error(symbol, format!("row {}: missing {}", row + 1, name)))
            };
            let number = |idx: usize, name: &str| -> Result<f64, QuantgateError> {
                cell(idx, name)?.trim().parse().map_err(|e| {
                    data_error(symbol, format!("row {}: invalid {} value: {}", row + 1, name, e))
                })
            };

            let raw_ts = cell(cols.timestamp, "timestamp")?;
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
                data_error(symbol, format!("row {}: invalid timestamp {:?}", row + 1, raw_ts))
            })?;

            candles.push(Candle {
                timestamp,
                open: number(cols.open, "open")?,
                high: number(cols.high, "high")?,
                low: number(cols.low, "low")?,
                close: number(cols.close, "close")?,
                volume: number(cols.volume, "volume")?,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantgateError> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| {
            data_error(
                "*",
                format!("failed to read directory {}: {}", self.data_dir.display(), e),
            )
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error("*", format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
