//! Reconcile pre-computed strategy results into a [`MetricsRecord`].
//!
//! Strategies written at different times report the same quantities under
//! different keys and units. Each canonical field has an ordered alias list;
//! the first present, non-null numeric value wins. Rates above 1 are read as
//! percentages. When the ending capital is missing it is rebuilt from the
//! profit figure, and profit is then always recomputed as a percentage.

use tracing::{debug, warn};

use super::error::QuantgateError;
use super::record::MetricsRecord;
use super::signal::RawMetrics;

pub const CAPITAL_END_KEYS: &[&str] = &[
    "capital_end",
    "final_equity",
    "final_capital",
    "capital_final",
    "ending_capital",
    "equity_final",
];
pub const CAPITAL_START_KEYS: &[&str] = &[
    "capital_start",
    "initial_capital",
    "starting_capital",
    "capital",
];
pub const PROFIT_KEYS: &[&str] = &[
    "profit_pct",
    "profit",
    "net_profit",
    "roi",
    "total_return",
    "return_pct",
];
pub const WIN_RATE_KEYS: &[&str] = &["win_rate", "winrate", "win_pct", "win_rate_pct"];
pub const MAX_DRAWDOWN_KEYS: &[&str] = &["max_drawdown", "max_dd", "drawdown", "max_drawdown_pct"];
pub const TRADE_COUNT_KEYS: &[&str] = &[
    "trade_count",
    "n_trades",
    "total_trades",
    "num_trades",
    "trades_count",
];
pub const PROFIT_FACTOR_KEYS: &[&str] = &["profit_factor", "pf"];
pub const SHARPE_KEYS: &[&str] = &["sharpe_ratio", "sharpe"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    /// A bare profit with magnitude below this is read as a percentage,
    /// otherwise as an absolute currency delta.
    pub percent_profit_threshold: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            percent_profit_threshold: 10.0,
        }
    }
}

fn first_of(raw: &RawMetrics, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| raw.number(k))
}

fn as_fraction(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

fn or_zero(value: Option<f64>, field: &str) -> f64 {
    value.unwrap_or_else(|| {
        debug!(field, "field missing from strategy result, using 0");
        0.0
    })
}

/// Normalize a raw result for a run that started with `capital`.
///
/// A `capital_start` present in the result takes precedence over `capital`.
/// Only a missing trade count is an error.
pub fn normalize(
    raw: &RawMetrics,
    capital: f64,
    config: &NormalizerConfig,
) -> Result<MetricsRecord, QuantgateError> {
    let Some(trade_count) = first_of(raw, TRADE_COUNT_KEYS) else {
        warn!("strategy result has no trade count");
        return Err(QuantgateError::Schema {
            field: "trade_count".into(),
        });
    };
    let trade_count = if trade_count.is_finite() && trade_count > 0.0 {
        trade_count.round() as usize
    } else {
        0
    };

    let capital_start = first_of(raw, CAPITAL_START_KEYS)
        .filter(|c| *c > 0.0)
        .unwrap_or(capital);
    let profit = first_of(raw, PROFIT_KEYS);

    let capital_end = match (first_of(raw, CAPITAL_END_KEYS), profit) {
        (Some(end), _) => end,
        (None, Some(p)) if p.abs() < config.percent_profit_threshold => {
            capital_start * (1.0 + p / 100.0)
        }
        (None, Some(p)) => capital_start + p,
        (None, None) => {
            debug!("no capital_end or profit in strategy result, assuming flat");
            capital_start
        }
    };

    let profit_pct = if capital_start > 0.0 {
        (capital_end - capital_start) / capital_start * 100.0
    } else {
        0.0
    };

    Ok(MetricsRecord {
        capital_start,
        capital_end,
        profit_pct,
        win_rate: as_fraction(or_zero(first_of(raw, WIN_RATE_KEYS), "win_rate")),
        max_drawdown: as_fraction(
            or_zero(first_of(raw, MAX_DRAWDOWN_KEYS), "max_drawdown").abs(),
        ),
        trade_count,
        profit_factor: or_zero(first_of(raw, PROFIT_FACTOR_KEYS), "profit_factor"),
        sharpe_ratio: or_zero(first_of(raw, SHARPE_KEYS), "sharpe_ratio"),
        score: None,
    })
}

/// Render a canonical record back into its raw form.
pub fn to_raw(record: &MetricsRecord) -> RawMetrics {
    RawMetrics::new()
        .with_number("capital_start", record.capital_start)
        .with_number("capital_end", record.capital_end)
        .with_number("profit_pct", record.profit_pct)
        .with_number("win_rate", record.win_rate)
        .with_number("max_drawdown", record.max_drawdown)
        .with_number("trade_count", record.trade_count as f64)
        .with_number("profit_factor", record.profit_factor)
        .with_number("sharpe_ratio", record.sharpe_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> NormalizerConfig {
        NormalizerConfig::default()
    }

    #[test]
    fn canonical_keys_pass_through() {
        let raw = RawMetrics::new()
            .with("capital_end", 115.0)
            .with("win_rate", 0.6)
            .with("max_drawdown", 0.1)
            .with("trade_count", 42);
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_relative_eq!(rec.capital_end, 115.0);
        assert_relative_eq!(rec.profit_pct, 15.0, epsilon = 1e-9);
        assert_relative_eq!(rec.win_rate, 0.6);
        assert_relative_eq!(rec.max_drawdown, 0.1);
        assert_eq!(rec.trade_count, 42);
    }

    #[test]
    fn legacy_aliases_and_percent_rates() {
        let raw = RawMetrics::new()
            .with("final_capital", 90.0)
            .with("winrate", 55.0)
            .with("max_dd", 12.5)
            .with("n_trades", "33");
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_relative_eq!(rec.profit_pct, -10.0, epsilon = 1e-9);
        assert_relative_eq!(rec.win_rate, 0.55);
        assert_relative_eq!(rec.max_drawdown, 0.125);
        assert_eq!(rec.trade_count, 33);
    }

    #[test]
    fn small_profit_is_percentage() {
        let raw = RawMetrics::new().with("profit", 5.0).with("total_trades", 30);
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_relative_eq!(rec.capital_end, 105.0, epsilon = 1e-9);
        assert_relative_eq!(rec.profit_pct, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn large_profit_is_currency_delta() {
        let raw = RawMetrics::new().with("profit", 25.0).with("total_trades", 30);
        let rec = normalize(&raw, 200.0, &cfg()).unwrap();
        assert_relative_eq!(rec.capital_end, 225.0, epsilon = 1e-9);
        assert_relative_eq!(rec.profit_pct, 12.5, epsilon = 1e-9);
    }

    #[test]
    fn threshold_is_configurable() {
        let raw = RawMetrics::new().with("profit", 25.0).with("total_trades", 30);
        let config = NormalizerConfig {
            percent_profit_threshold: 50.0,
        };
        let rec = normalize(&raw, 200.0, &config).unwrap();
        assert_relative_eq!(rec.capital_end, 250.0, epsilon = 1e-9);
    }

    #[test]
    fn first_alias_wins_and_nulls_are_skipped() {
        let raw = RawMetrics::new()
            .with("win_rate", serde_json::Value::Null)
            .with("winrate", 0.4)
            .with("win_pct", 0.9)
            .with("trade_count", 30);
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_relative_eq!(rec.win_rate, 0.4);
    }

    #[test]
    fn missing_trade_count_is_schema_error() {
        let raw = RawMetrics::new().with("capital_end", 120.0);
        let err = normalize(&raw, 100.0, &cfg()).unwrap_err();
        assert!(matches!(err, QuantgateError::Schema { ref field } if field == "trade_count"));
    }

    #[test]
    fn missing_optional_fields_default_to_zero() {
        let raw = RawMetrics::new().with("num_trades", 0);
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_eq!(rec.capital_end, 100.0);
        assert_eq!(rec.profit_pct, 0.0);
        assert_eq!(rec.win_rate, 0.0);
        assert_eq!(rec.max_drawdown, 0.0);
        assert_eq!(rec.profit_factor, 0.0);
        assert_eq!(rec.sharpe_ratio, 0.0);
    }

    #[test]
    fn reported_capital_start_overrides_argument() {
        let raw = RawMetrics::new()
            .with("initial_capital", 1000.0)
            .with("equity_final", 1100.0)
            .with("trades_count", 31);
        let rec = normalize(&raw, 100.0, &cfg()).unwrap();
        assert_eq!(rec.capital_start, 1000.0);
        assert_relative_eq!(rec.profit_pct, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn infinite_profit_factor_survives_renormalizing() {
        use crate::domain::indicator::test_support::closes;
        use crate::domain::metrics::BacktestMetrics;
        use crate::domain::signal::{Signal, SignalTable};
        use crate::domain::simulator::{SimulationConfig, simulate};

        let table = SignalTable::new(
            closes(&[100.0, 110.0, 121.0]),
            vec![Some(Signal::EnterLong), Some(Signal::Hold), Some(Signal::ExitLong)],
        );
        let backtest = BacktestMetrics::compute(&simulate(&table, &SimulationConfig::default()));
        let once = MetricsRecord::from_backtest(&backtest);
        assert!(once.profit_factor.is_infinite());

        let twice = normalize(&to_raw(&once), 100.0, &cfg()).unwrap();
        assert_eq!(twice.profit_factor, f64::INFINITY);
        assert_eq!(normalize(&to_raw(&twice), 100.0, &cfg()).unwrap(), twice);
    }

    #[test]
    fn non_finite_numbers_are_stored_as_strings() {
        let raw = RawMetrics::new()
            .with_number("profit_factor", f64::INFINITY)
            .with_number("sharpe_ratio", f64::NEG_INFINITY);
        assert_eq!(raw.0["profit_factor"], serde_json::Value::String("inf".into()));
        assert_eq!(raw.number("profit_factor"), Some(f64::INFINITY));
        assert_eq!(raw.number("sharpe_ratio"), Some(f64::NEG_INFINITY));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(
                capital in 1.0f64..10_000.0,
                end_ratio in 0.1f64..3.0,
                win_rate in 0.0f64..=1.0,
                max_dd in 0.0f64..=1.0,
                trades in 0usize..500,
                pf in prop_oneof![0.0f64..10.0, Just(f64::INFINITY)],
                sharpe in -3.0f64..3.0,
            ) {
                let raw = RawMetrics::new()
                    .with("capital_end", capital * end_ratio)
                    .with("win_rate", win_rate)
                    .with("max_drawdown", max_dd)
                    .with("trade_count", trades as f64)
                    .with_number("profit_factor", pf)
                    .with("sharpe_ratio", sharpe);
                let once = normalize(&raw, capital, &NormalizerConfig::default()).unwrap();
                let twice = normalize(&to_raw(&once), capital, &NormalizerConfig::default()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
