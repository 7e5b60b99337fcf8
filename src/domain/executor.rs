//! Run one strategy on one symbol and turn its output into a metrics record.
//!
//! The strategy call runs on its own thread so a stuck strategy cannot stall
//! the caller past the configured timeout. A timed-out worker is left detached
//! and its eventual result is discarded.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::candle::{Candle, validate_candles};
use crate::domain::error::QuantgateError;
use crate::domain::metrics::BacktestMetrics;
use crate::domain::normalizer::{NormalizerConfig, normalize};
use crate::domain::record::{MetricsRecord, StrategyRunResult};
use crate::domain::scorer::asset_score;
use crate::domain::signal::StrategyOutput;
use crate::domain::simulator::{SimulationConfig, check_shape, simulate};
use crate::domain::strategy::{Strategy, StrategyParams};
use crate::ports::data_port::DataPort;

/// Canonical record plus, for signal-table strategies, the full simulation
/// metrics it was derived from.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: MetricsRecord,
    pub backtest: Option<BacktestMetrics>,
}

#[derive(Debug, Clone)]
pub struct Executor {
    pub initial_capital: f64,
    pub params: StrategyParams,
    pub timeout: Duration,
    pub normalizer: NormalizerConfig,
}

impl Executor {
    pub fn new(initial_capital: f64, timeout: Duration) -> Self {
        Executor {
            initial_capital,
            params: StrategyParams::default(),
            timeout,
            normalizer: NormalizerConfig::default(),
        }
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Load candles for `symbol`, run the strategy and normalize its output.
    pub fn execute(
        &self,
        strategy: &Arc<dyn Strategy>,
        data: &dyn DataPort,
        symbol: &str,
    ) -> Result<RunOutcome, QuantgateError> {
        let candles = data.load_candles(symbol)?;
        validate_candles(&candles).map_err(|reason| QuantgateError::Data {
            symbol: symbol.to_string(),
            reason,
        })?;

        let output = self.run_with_timeout(strategy, candles, symbol)?;
        self.dispatch(strategy.as_ref(), output, symbol)
    }

    /// [`execute`](Self::execute) followed by asset scoring.
    pub fn run_symbol(
        &self,
        strategy: &Arc<dyn Strategy>,
        data: &dyn DataPort,
        symbol: &str,
    ) -> Result<StrategyRunResult, QuantgateError> {
        let outcome = self.execute(strategy, data, symbol)?;
        let score = asset_score(&outcome.record);
        Ok(StrategyRunResult {
            symbol: symbol.to_string(),
            strategy_name: strategy.name().to_string(),
            metrics: outcome.record.with_score(score),
            score,
            error: None,
        })
    }

    fn run_with_timeout(
        &self,
        strategy: &Arc<dyn Strategy>,
        candles: Vec<Candle>,
        symbol: &str,
    ) -> Result<StrategyOutput, QuantgateError> {
        let (tx, rx) = mpsc::channel();
        let worker_strategy = Arc::clone(strategy);
        let params = self.params.clone();
        let capital = self.initial_capital;

        thread::Builder::new()
            .name(format!("strategy-{}-{}", strategy.name(), symbol))
            .spawn(move || {
                let result = worker_strategy.run(&candles, capital, &params);
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    strategy = strategy.name(),
                    symbol,
                    seconds = self.timeout.as_secs(),
                    "strategy run timed out"
                );
                Err(QuantgateError::Timeout {
                    strategy: strategy.name().to_string(),
                    symbol: symbol.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(QuantgateError::StrategyExecution {
                strategy: strategy.name().to_string(),
                reason: "strategy worker panicked".to_string(),
            }),
        }
    }

    fn dispatch(
        &self,
        strategy: &dyn Strategy,
        output: StrategyOutput,
        symbol: &str,
    ) -> Result<RunOutcome, QuantgateError> {
        match output {
            StrategyOutput::SignalTable(table) => {
                check_shape(&table).map_err(|reason| QuantgateError::Data {
                    symbol: symbol.to_string(),
                    reason,
                })?;
                let config = SimulationConfig {
                    initial_capital: self.initial_capital,
                    bracket: strategy.bracket(&self.params),
                };
                let result = simulate(&table, &config);
                let backtest = BacktestMetrics::compute(&result);
                debug!(
                    strategy = strategy.name(),
                    symbol,
                    processed_bars = table.processed_bars(),
                    trades = backtest.total_trades,
                    "simulation finished"
                );
                Ok(RunOutcome {
                    record: MetricsRecord::from_backtest(&backtest),
                    backtest: Some(backtest),
                })
            }
            StrategyOutput::RawMetrics(raw) => {
                let record = normalize(&raw, self.initial_capital, &self.normalizer)?;
                Ok(RunOutcome {
                    record,
                    backtest: None,
                })
            }
        }
    }
}
