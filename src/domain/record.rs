//! Canonical metrics record shared by the normalizer, scorer and validator.

use serde::{Deserialize, Deserializer, Serialize};

use super::metrics::BacktestMetrics;

/// JSON has no infinity; serde_json writes it as `null`. Read it back the
/// same way so an unbounded profit factor survives a report round trip.
pub(crate) fn null_as_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// One run's performance in a single unit convention.
///
/// `win_rate` and `max_drawdown` are fractions in [0, 1]; `profit_pct` is a
/// percentage return on `capital_start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub capital_start: f64,
    pub capital_end: f64,
    pub profit_pct: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    #[serde(deserialize_with = "null_as_infinity")]
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub score: Option<f64>,
}

impl MetricsRecord {
    pub fn from_backtest(metrics: &BacktestMetrics) -> Self {
        MetricsRecord {
            capital_start: metrics.initial_capital,
            capital_end: metrics.final_equity,
            profit_pct: metrics.roi,
            win_rate: metrics.win_rate,
            max_drawdown: metrics.max_drawdown,
            trade_count: metrics.total_trades,
            profit_factor: metrics.profit_factor,
            sharpe_ratio: metrics.sharpe_ratio,
            score: None,
        }
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }
}

/// Outcome of one (strategy, symbol) pair. A failed run keeps zeroed
/// metrics, no score, and the reason it was excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRunResult {
    pub symbol: String,
    pub strategy_name: String,
    pub metrics: MetricsRecord,
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StrategyRunResult {
    pub fn failed(strategy_name: &str, symbol: &str, error: impl ToString) -> Self {
        StrategyRunResult {
            symbol: symbol.to_string(),
            strategy_name: strategy_name.to_string(),
            metrics: MetricsRecord::default(),
            score: None,
            error: Some(error.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
