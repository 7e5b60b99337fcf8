//! Batch runner over the strategy × symbol grid.
//!
//! Strategies form the outer loop and symbols the inner one. A progress
//! snapshot is published before the first pair and after every pair, so a
//! reader polling the snapshot always sees partial rankings for the results
//! gathered so far. A finished batch persists a [`BatchReport`] and then
//! publishes a `completed` snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::error::QuantgateError;
use crate::domain::executor::Executor;
use crate::domain::record::StrategyRunResult;
use crate::domain::scorer::{MAX_DD_ACCEPTABLE, MIN_TRADES, StrategyRanking, rank_strategies};
use crate::domain::strategy::load_deployed;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::strategy_port::{DeploymentStore, StrategyLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
}

/// Snapshot of a batch in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
    pub current_strategy: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<StrategyRanking>,
}

impl BatchProgress {
    pub fn new(
        status: BatchStatus,
        current: usize,
        total: usize,
        current_strategy: Option<String>,
        results: Vec<StrategyRanking>,
    ) -> Self {
        BatchProgress {
            status,
            current,
            total,
            percentage: percentage(current, total),
            current_strategy,
            timestamp: Utc::now(),
            results,
        }
    }
}

fn percentage(current: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        (current * 100 / total) as u32
    }
}

/// Scoring constants the report was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub capital: f64,
    pub max_dd_acceptable: f64,
    pub min_trades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub timestamp: DateTime<Utc>,
    pub config: ReportConfig,
    pub assets: Vec<String>,
    pub strategies: Vec<String>,
    pub strategy_rankings: Vec<StrategyRanking>,
    pub detailed_results: BTreeMap<String, Vec<StrategyRunResult>>,
}

impl BatchReport {
    /// Successful runs, failed runs.
    pub fn run_counts(&self) -> (usize, usize) {
        self.detailed_results
            .values()
            .flatten()
            .fold((0, 0), |(ok, failed), r| {
                if r.succeeded() {
                    (ok + 1, failed)
                } else {
                    (ok, failed + 1)
                }
            })
    }
}

#[derive(Clone)]
pub struct ProgressiveRunner {
    executor: Executor,
    data: Arc<dyn DataPort>,
    reports: Arc<dyn ReportPort>,
    loader: Arc<dyn StrategyLoader>,
    store: Arc<dyn DeploymentStore>,
}

impl ProgressiveRunner {
    pub fn new(
        executor: Executor,
        data: Arc<dyn DataPort>,
        reports: Arc<dyn ReportPort>,
        loader: Arc<dyn StrategyLoader>,
        store: Arc<dyn DeploymentStore>,
    ) -> Self {
        ProgressiveRunner {
            executor,
            data,
            reports,
            loader,
            store,
        }
    }

    /// Every deployed strategy and every symbol with data.
    pub fn discover(&self) -> Result<(Vec<String>, Vec<String>), QuantgateError> {
        Ok((self.store.list()?, self.data.list_symbols()?))
    }

    /// Run the full grid. Returns `None` when `cancel` was raised before the
    /// grid finished; no report is written in that case.
    pub fn run(
        &self,
        strategies: &[String],
        symbols: &[String],
        cancel: &AtomicBool,
    ) -> Result<Option<BatchReport>, QuantgateError> {
        let total = strategies.len() * symbols.len();
        let mut results: BTreeMap<String, Vec<StrategyRunResult>> = BTreeMap::new();
        let mut current = 0;

        info!(
            strategies = strategies.len(),
            symbols = symbols.len(),
            "batch started"
        );
        self.publish(&BatchProgress::new(
            BatchStatus::Running,
            0,
            total,
            None,
            Vec::new(),
        ));

        for name in strategies {
            let loaded = load_deployed(self.store.as_ref(), self.loader.as_ref(), name);
            if let Err(e) = &loaded {
                warn!(strategy = %name, error = %e, "strategy could not be loaded, skipping its symbols");
            }

            for symbol in symbols {
                if cancel.load(Ordering::Relaxed) {
                    info!(current, total, "batch cancelled");
                    self.publish(&BatchProgress::new(
                        BatchStatus::Idle,
                        current,
                        total,
                        None,
                        rank_strategies(strategies, &results, symbols.len()),
                    ));
                    return Ok(None);
                }

                current += 1;
                let run = match &loaded {
                    Ok(strategy) => self
                        .executor
                        .run_symbol(strategy, self.data.as_ref(), symbol)
                        .unwrap_or_else(|e| {
                            warn!(strategy = %name, symbol = %symbol, error = %e, "run excluded");
                            StrategyRunResult::failed(name, symbol, e)
                        }),
                    Err(e) => StrategyRunResult::failed(name, symbol, e),
                };
                debug!(strategy = %name, symbol = %symbol, score = ?run.score, "pair finished");
                results.entry(name.clone()).or_default().push(run);

                self.publish(&BatchProgress::new(
                    BatchStatus::Running,
                    current,
                    total,
                    Some(name.clone()),
                    rank_strategies(strategies, &results, symbols.len()),
                ));
            }
        }

        let report = BatchReport {
            timestamp: Utc::now(),
            config: ReportConfig {
                capital: self.executor.initial_capital,
                max_dd_acceptable: MAX_DD_ACCEPTABLE,
                min_trades: MIN_TRADES,
            },
            assets: symbols.to_vec(),
            strategies: strategies.to_vec(),
            strategy_rankings: rank_strategies(strategies, &results, symbols.len()),
            detailed_results: results,
        };
        self.reports.write_report(&report)?;

        self.publish(&BatchProgress::new(
            BatchStatus::Completed,
            total,
            total,
            None,
            report.strategy_rankings.clone(),
        ));
        let (ok, failed) = report.run_counts();
        info!(ok, failed, "batch completed");
        Ok(Some(report))
    }

    /// Run the grid on a background thread.
    pub fn spawn(
        self,
        strategies: Vec<String>,
        symbols: Vec<String>,
    ) -> Result<BatchHandle, QuantgateError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let join = thread::Builder::new()
            .name("progressive-batch".into())
            .spawn(move || self.run(&strategies, &symbols, &worker_cancel))?;
        Ok(BatchHandle { cancel, join })
    }

    // A lost snapshot only delays what a reader sees; the batch goes on.
    fn publish(&self, progress: &BatchProgress) {
        if let Err(e) = self.reports.publish_progress(progress) {
            warn!(error = %e, current = progress.current, "failed to publish progress");
        }
    }
}

pub struct BatchHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<Result<Option<BatchReport>, QuantgateError>>,
}

impl BatchHandle {
    /// Ask the batch to stop before its next pair.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<Option<BatchReport>, QuantgateError> {
        self.join
            .join()
            .map_err(|_| std::io::Error::other("batch worker panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::candle::Candle;
    use crate::domain::indicator::test_support::closes;
    use crate::domain::scorer::{RankingStatus, REJECTED_SCORE};
    use crate::domain::strategy::{Strategy, build_strategy};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Candles;

    impl DataPort for Candles {
        fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>, QuantgateError> {
            match symbol {
                "MISSING" => Err(QuantgateError::Data {
                    symbol: symbol.into(),
                    reason: "no file".into(),
                }),
                _ => Ok(closes(&[100.0, 101.0, 102.0])),
            }
        }

        fn list_symbols(&self) -> Result<Vec<String>, QuantgateError> {
            Ok(vec!["BTCUSDT".into(), "ETHUSDT".into()])
        }
    }

    #[derive(Default)]
    struct Reports {
        progress: Mutex<Vec<BatchProgress>>,
        report: Mutex<Option<BatchReport>>,
    }

    impl ReportPort for Reports {
        fn publish_progress(&self, progress: &BatchProgress) -> Result<(), QuantgateError> {
            self.progress.lock().unwrap().push(progress.clone());
            Ok(())
        }

        fn write_report(&self, report: &BatchReport) -> Result<(), QuantgateError> {
            *self.report.lock().unwrap() = Some(report.clone());
            Ok(())
        }

        fn read_progress(&self) -> Result<Option<BatchProgress>, QuantgateError> {
            Ok(self.progress.lock().unwrap().last().cloned())
        }

        fn read_report(&self) -> Result<Option<BatchReport>, QuantgateError> {
            Ok(self.report.lock().unwrap().clone())
        }
    }

    struct Store(HashMap<String, String>);

    impl StrategyLoader for Store {
        fn load(&self, name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError> {
            let config = FileConfigAdapter::from_string(code).map_err(|reason| {
                QuantgateError::ConfigParse {
                    file: name.into(),
                    reason,
                }
            })?;
            build_strategy(name, &config)
        }
    }

    impl DeploymentStore for Store {
        fn snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, QuantgateError> {
            Ok(self.0.get(name).map(|c| c.as_bytes().to_vec()))
        }

        fn restore(&self, _name: &str, _snapshot: Option<&[u8]>) -> Result<(), QuantgateError> {
            Ok(())
        }

        fn list(&self) -> Result<Vec<String>, QuantgateError> {
            let mut names: Vec<String> = self.0.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    // score = 30 + 60 * 0.3 - 10 * 1.2 = 36
    const GOOD: &str = "[metrics]\nfinal_equity = 130\nwin_rate = 0.6\nmax_drawdown = 0.1\nn_trades = 40\n";
    // score = -20 + 12 - 36 = -44
    const BAD: &str = "[metrics]\nfinal_equity = 80\nwin_rate = 0.4\nmax_drawdown = 0.3\nn_trades = 40\n";

    fn runner(reports: Arc<Reports>) -> ProgressiveRunner {
        let store = Arc::new(Store(HashMap::from([
            ("good".to_string(), GOOD.to_string()),
            ("bad".to_string(), BAD.to_string()),
        ])));
        ProgressiveRunner::new(
            Executor::new(100.0, Duration::from_secs(5)),
            Arc::new(Candles),
            reports,
            store.clone(),
            store,
        )
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn percentage_is_floored() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 66);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn publishes_before_and_after_every_pair() {
        let reports = Arc::new(Reports::default());
        let report = runner(reports.clone())
            .run(
                &names(&["good", "bad"]),
                &names(&["BTCUSDT", "ETHUSDT"]),
                &AtomicBool::new(false),
            )
            .unwrap()
            .unwrap();

        let progress = reports.progress.lock().unwrap();
        assert_eq!(progress.len(), 6);
        assert_eq!(progress[0].status, BatchStatus::Running);
        assert_eq!(progress[0].current, 0);
        assert!(progress[0].results.is_empty());

        assert_eq!(progress[1].current, 1);
        assert_eq!(progress[1].percentage, 25);
        assert_eq!(progress[1].current_strategy.as_deref(), Some("good"));
        assert_eq!(progress[1].results.len(), 1);
        assert_eq!(progress[3].results.len(), 2);

        let last = progress.last().unwrap();
        assert_eq!(last.status, BatchStatus::Completed);
        assert_eq!(last.percentage, 100);
        assert_eq!(last.results, report.strategy_rankings);
        assert_eq!(reports.report.lock().unwrap().as_ref(), Some(&report));
    }

    #[test]
    fn report_ranks_best_first() {
        let report = runner(Arc::new(Reports::default()))
            .run(
                &names(&["bad", "good"]),
                &names(&["BTCUSDT", "ETHUSDT"]),
                &AtomicBool::new(false),
            )
            .unwrap()
            .unwrap();

        assert_eq!(report.strategy_rankings[0].strategy, "good");
        assert!((report.strategy_rankings[0].final_score - 36.0).abs() < 1e-9);
        assert_eq!(report.strategy_rankings[0].status, RankingStatus::Approved);
        assert_eq!(report.strategy_rankings[1].status, RankingStatus::Rejected);
        assert_eq!(report.config.min_trades, 30);
        assert_eq!(report.detailed_results["good"].len(), 2);
        assert_eq!(report.run_counts(), (4, 0));
    }

    #[test]
    fn failures_are_excluded_but_counted() {
        let reports = Arc::new(Reports::default());
        let report = runner(reports.clone())
            .run(
                &names(&["good", "ghost"]),
                &names(&["BTCUSDT", "MISSING"]),
                &AtomicBool::new(false),
            )
            .unwrap()
            .unwrap();

        assert_eq!(report.run_counts(), (1, 3));
        let good = &report.strategy_rankings[0];
        assert_eq!((good.valid_assets, good.total_assets), (1, 2));

        let ghost = &report.strategy_rankings[1];
        assert_eq!(ghost.strategy, "ghost");
        assert_eq!(ghost.final_score, REJECTED_SCORE);
        assert!(report.detailed_results["ghost"].iter().all(|r| r.error.is_some()));
        assert_eq!(reports.progress.lock().unwrap().len(), 6);
    }

    #[test]
    fn cancelled_batch_ends_idle_without_report() {
        let reports = Arc::new(Reports::default());
        let outcome = runner(reports.clone())
            .run(&names(&["good"]), &names(&["BTCUSDT"]), &AtomicBool::new(true))
            .unwrap();

        assert!(outcome.is_none());
        assert!(reports.report.lock().unwrap().is_none());
        let last = reports.read_progress().unwrap().unwrap();
        assert_eq!(last.status, BatchStatus::Idle);
        assert_eq!(last.current, 0);
    }

    #[test]
    fn spawned_batch_discovers_and_completes() {
        let reports = Arc::new(Reports::default());
        let runner = runner(reports.clone());
        let (strategies, symbols) = runner.discover().unwrap();
        assert_eq!(strategies, names(&["bad", "good"]));

        let handle = runner.spawn(strategies, symbols).unwrap();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.assets, names(&["BTCUSDT", "ETHUSDT"]));
        assert_eq!(
            reports.read_progress().unwrap().unwrap().status,
            BatchStatus::Completed
        );
    }
}
