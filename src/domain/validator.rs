//! A/B validation of a revised strategy against the deployed one.
//!
//! Both versions are loaded as isolated instances and run over the same
//! symbols. The deployed source is snapshotted before anything runs and is
//! verified, and restored if it changed, before the call returns. Per-symbol
//! failures only shrink the sample; the snapshot and restore steps are the
//! only fatal ones.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::domain::error::QuantgateError;
use crate::domain::executor::Executor;
use crate::domain::normalizer::NormalizerConfig;
use crate::domain::record::MetricsRecord;
use crate::domain::scorer::{MAX_DD_ACCEPTABLE, MIN_TRADES, approval_score, round_to};
use crate::domain::strategy::StrategyParams;
use crate::ports::data_port::DataPort;
use crate::ports::strategy_port::{DeploymentStore, StrategyLoader};

pub const WIN_RATE_THRESHOLD: f64 = 0.80;
pub const MIN_IMPROVEMENT_FACTOR: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Idle,
    RunningOld,
    RunningNew,
    Comparing,
    Decided,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub strategy_name: String,
    pub old_code: String,
    pub new_code: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub initial_capital: f64,
}

/// Mean metrics of one version over its successful symbols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub win_rate: f64,
    pub profit_pct: f64,
    pub max_drawdown: f64,
    pub trade_count: f64,
    pub approval_score: f64,
}

impl AveragedMetrics {
    pub fn from_records(records: &[MetricsRecord]) -> Self {
        if records.is_empty() {
            return AveragedMetrics::default();
        }
        let n = records.len() as f64;
        let mean = |f: &dyn Fn(&MetricsRecord) -> f64| records.iter().map(f).sum::<f64>() / n;
        AveragedMetrics {
            win_rate: mean(&|r: &MetricsRecord| r.win_rate),
            profit_pct: mean(&|r: &MetricsRecord| r.profit_pct),
            max_drawdown: mean(&|r: &MetricsRecord| r.max_drawdown),
            trade_count: mean(&|r: &MetricsRecord| r.trade_count as f64),
            approval_score: mean(&approval_score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub old: f64,
    pub new: f64,
    pub improved: bool,
    pub diff: f64,
}

impl MetricDelta {
    fn higher_is_better(old: f64, new: f64) -> Self {
        MetricDelta {
            old,
            new,
            improved: new > old,
            diff: new - old,
        }
    }

    fn lower_is_better(old: f64, new: f64) -> Self {
        MetricDelta {
            old,
            new,
            improved: new < old,
            diff: old - new,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub win_rate: MetricDelta,
    pub profit_pct: MetricDelta,
    pub max_drawdown: MetricDelta,
    pub approval_score: MetricDelta,
}

impl Comparison {
    pub fn between(old: &AveragedMetrics, new: &AveragedMetrics) -> Self {
        Comparison {
            win_rate: MetricDelta::higher_is_better(old.win_rate, new.win_rate),
            profit_pct: MetricDelta::higher_is_better(old.profit_pct, new.profit_pct),
            max_drawdown: MetricDelta::lower_is_better(old.max_drawdown, new.max_drawdown),
            approval_score: MetricDelta::higher_is_better(old.approval_score, new.approval_score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCriteria {
    pub win_rate_threshold: bool,
    pub min_improvement: bool,
    pub drawdown_limit: bool,
    pub positive_profit: bool,
    pub sufficient_trades: bool,
}

impl ApprovalCriteria {
    pub fn evaluate(old: &AveragedMetrics, new: &AveragedMetrics) -> Self {
        ApprovalCriteria {
            win_rate_threshold: new.win_rate >= WIN_RATE_THRESHOLD,
            min_improvement: new.approval_score > old.approval_score * MIN_IMPROVEMENT_FACTOR,
            drawdown_limit: new.max_drawdown <= MAX_DD_ACCEPTABLE,
            positive_profit: new.profit_pct > 0.0,
            sufficient_trades: new.trade_count >= MIN_TRADES as f64,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.win_rate_threshold
            && self.min_improvement
            && self.drawdown_limit
            && self.positive_profit
            && self.sufficient_trades
    }
}

/// Relative approval score change in percent, two decimals. Zero when the
/// old score is not positive.
pub fn improvement_pct(old_score: f64, new_score: f64) -> f64 {
    if old_score <= 0.0 {
        return 0.0;
    }
    round_to((new_score - old_score) / old_score * 100.0, 2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub approved: bool,
    pub old_metrics: AveragedMetrics,
    pub new_metrics: AveragedMetrics,
    pub comparison: Comparison,
    pub approval_criteria: ApprovalCriteria,
    pub improvement_pct: f64,
    /// Successful runs of the new version.
    pub tests_run: usize,
    pub symbols_tested: Vec<String>,
    pub state: ValidationState,
}

impl ValidationReport {
    pub fn decide(old: &[MetricsRecord], new: &[MetricsRecord], symbols: &[String]) -> Self {
        let old_metrics = AveragedMetrics::from_records(old);
        let new_metrics = AveragedMetrics::from_records(new);
        let approval_criteria = ApprovalCriteria::evaluate(&old_metrics, &new_metrics);
        ValidationReport {
            approved: approval_criteria.all_passed(),
            comparison: Comparison::between(&old_metrics, &new_metrics),
            improvement_pct: improvement_pct(
                old_metrics.approval_score,
                new_metrics.approval_score,
            ),
            old_metrics,
            new_metrics,
            approval_criteria,
            tests_run: new.len(),
            symbols_tested: symbols.to_vec(),
            state: ValidationState::Decided,
        }
    }
}

fn infrastructure(strategy: &str, action: &str, err: QuantgateError) -> QuantgateError {
    QuantgateError::ValidationInfrastructure {
        strategy: strategy.to_string(),
        action: action.to_string(),
        reason: err.to_string(),
    }
}

/// Holds the deployed bytes of one strategy and puts them back if they
/// changed. Restoration runs on [`release`](Self::release) or, failing that,
/// on drop.
pub struct DeploymentGuard<'a> {
    store: &'a dyn DeploymentStore,
    name: String,
    snapshot: Option<Vec<u8>>,
    released: bool,
}

impl<'a> DeploymentGuard<'a> {
    pub fn acquire(store: &'a dyn DeploymentStore, name: &str) -> Result<Self, QuantgateError> {
        let snapshot = store
            .snapshot(name)
            .map_err(|e| infrastructure(name, "snapshot", e))?;
        Ok(DeploymentGuard {
            store,
            name: name.to_string(),
            snapshot,
            released: false,
        })
    }

    pub fn snapshot(&self) -> Option<&[u8]> {
        self.snapshot.as_deref()
    }

    /// Verify the deployment and restore it if it changed.
    pub fn release(mut self) -> Result<(), QuantgateError> {
        self.released = true;
        self.restore_if_changed()
    }

    fn restore_if_changed(&self) -> Result<(), QuantgateError> {
        let current = self
            .store
            .snapshot(&self.name)
            .map_err(|e| infrastructure(&self.name, "verify", e))?;
        if current == self.snapshot {
            return Ok(());
        }
        warn!(strategy = %self.name, "deployed source changed during validation, restoring");
        self.store
            .restore(&self.name, self.snapshot.as_deref())
            .map_err(|e| infrastructure(&self.name, "restore", e))
    }
}

impl Drop for DeploymentGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.restore_if_changed() {
            error!(strategy = %self.name, error = %e, "failed to restore deployment");
        }
    }
}

pub struct Validator {
    data: Arc<dyn DataPort>,
    loader: Arc<dyn StrategyLoader>,
    store: Arc<dyn DeploymentStore>,
    timeout: Duration,
    normalizer: NormalizerConfig,
    state: ValidationState,
}

impl Validator {
    pub fn new(
        data: Arc<dyn DataPort>,
        loader: Arc<dyn StrategyLoader>,
        store: Arc<dyn DeploymentStore>,
        timeout: Duration,
    ) -> Self {
        Validator {
            data,
            loader,
            store,
            timeout,
            normalizer: NormalizerConfig::default(),
            state: ValidationState::Idle,
        }
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn validate(
        &mut self,
        request: &ValidationRequest,
    ) -> Result<ValidationReport, QuantgateError> {
        self.state = ValidationState::Idle;
        let name = request.strategy_name.as_str();
        info!(
            strategy = name,
            symbols = request.symbols.len(),
            timeframe = %request.timeframe,
            "validation started"
        );

        let store = Arc::clone(&self.store);
        let guard = match DeploymentGuard::acquire(store.as_ref(), name) {
            Ok(guard) => guard,
            Err(e) => {
                self.state = ValidationState::Failed;
                return Err(e);
            }
        };

        let executor = Executor::new(request.initial_capital, self.timeout)
            .with_params(StrategyParams {
                timeframe: request.timeframe.clone(),
                ..StrategyParams::default()
            })
            .with_normalizer(self.normalizer.clone());

        self.state = ValidationState::RunningOld;
        let old = self.run_version(&executor, request, "old", &request.old_code);
        self.state = ValidationState::RunningNew;
        let new = self.run_version(&executor, request, "new", &request.new_code);

        self.state = ValidationState::Comparing;
        let report = ValidationReport::decide(&old, &new, &request.symbols);

        if let Err(e) = guard.release() {
            self.state = ValidationState::Failed;
            return Err(e);
        }
        self.state = ValidationState::Decided;
        info!(
            strategy = name,
            approved = report.approved,
            improvement_pct = report.improvement_pct,
            tests_run = report.tests_run,
            "validation decided"
        );
        Ok(report)
    }

    fn run_version(
        &self,
        executor: &Executor,
        request: &ValidationRequest,
        version: &str,
        code: &str,
    ) -> Vec<MetricsRecord> {
        let strategy = match self.loader.load(&request.strategy_name, code) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(strategy = %request.strategy_name, version, error = %e, "version failed to load");
                return Vec::new();
            }
        };

        request
            .symbols
            .iter()
            .filter_map(|symbol| {
                match executor.execute(&strategy, self.data.as_ref(), symbol) {
                    Ok(outcome) => Some(outcome.record),
                    Err(e) => {
                        warn!(version, symbol = %symbol, error = %e, "symbol excluded");
                        None
                    }
                }
            })
            .collect()
    }
}
