//! Engine configuration, read from the `[engine]`, `[validator]` and
//! `[normalizer]` sections and validated before any run starts.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::error::QuantgateError;
use crate::domain::normalizer::NormalizerConfig;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100.0;
pub const DEFAULT_TIMEFRAME: &str = "15m";
pub const DEFAULT_RUN_TIMEOUT_SECS: i64 = 60;
pub const DEFAULT_VALIDATOR_TIMEOUT_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub timeframe: String,
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub strategies_dir: PathBuf,
    pub run_timeout: Duration,
    pub validator_timeout: Duration,
    pub normalizer: NormalizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            data_dir: PathBuf::from("DATA_spot"),
            reports_dir: PathBuf::from("reports"),
            strategies_dir: PathBuf::from("strategies"),
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS as u64),
            validator_timeout: Duration::from_secs(DEFAULT_VALIDATOR_TIMEOUT_SECS as u64),
            normalizer: NormalizerConfig::default(),
        }
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> QuantgateError {
    QuantgateError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn timeout(
    config: &dyn ConfigPort,
    section: &str,
    default: i64,
) -> Result<Duration, QuantgateError> {
    let secs = config.get_int(section, "run_timeout_secs", default);
    if secs <= 0 {
        return Err(invalid(
            section,
            "run_timeout_secs",
            "run_timeout_secs must be positive",
        ));
    }
    Ok(Duration::from_secs(secs as u64))
}

fn path_or(config: &dyn ConfigPort, key: &str, default: PathBuf) -> PathBuf {
    config
        .get_string("engine", key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuantgateError> {
        let defaults = EngineConfig::default();

        let initial_capital = config.get_double("engine", "initial_capital", DEFAULT_INITIAL_CAPITAL);
        if !(initial_capital.is_finite() && initial_capital > 0.0) {
            return Err(invalid(
                "engine",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }

        let timeframe = config
            .get_string("engine", "timeframe")
            .unwrap_or(defaults.timeframe);
        if timeframe.trim().is_empty() {
            return Err(invalid("engine", "timeframe", "timeframe must not be empty"));
        }

        let threshold = config.get_double(
            "normalizer",
            "percent_profit_threshold",
            defaults.normalizer.percent_profit_threshold,
        );
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(invalid(
                "normalizer",
                "percent_profit_threshold",
                "percent_profit_threshold must be non-negative",
            ));
        }

        Ok(EngineConfig {
            initial_capital,
            timeframe,
            data_dir: path_or(config, "data_dir", defaults.data_dir),
            reports_dir: path_or(config, "reports_dir", defaults.reports_dir),
            strategies_dir: path_or(config, "strategies_dir", defaults.strategies_dir),
            run_timeout: timeout(config, "engine", DEFAULT_RUN_TIMEOUT_SECS)?,
            validator_timeout: timeout(config, "validator", DEFAULT_VALIDATOR_TIMEOUT_SECS)?,
            normalizer: NormalizerConfig {
                percent_profit_threshold: threshold,
            },
        })
    }

    pub fn full_report_path(&self) -> PathBuf {
        self.reports_dir.join("full_report.json")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.reports_dir.join("batch_progress.json")
    }
}
