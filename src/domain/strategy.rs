//! Strategy sources and the callable interface the engine runs.
//!
//! A strategy document is INI text. A `[strategy]` section defines a
//! rule-based signal generator; a `[metrics]` section instead carries a
//! pre-computed result that is returned unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::candle::Candle;
use crate::domain::error::{ParseError, QuantgateError};
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::{compute_indicators, evaluate, is_defined};
use crate::domain::rule_parser;
use crate::domain::signal::{RawMetrics, Signal, SignalTable, StrategyOutput};
use crate::domain::simulator::BracketConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::strategy_port::{DeploymentStore, StrategyLoader};

pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Run parameters passed to every strategy call.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub timeframe: String,
    /// Numeric overrides of strategy settings, keyed by setting name.
    pub overrides: BTreeMap<String, f64>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            timeframe: "15m".to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

/// A signal generator or result provider for one symbol's candles.
///
/// Instances are independent of each other; two loads of different code
/// under the same name never share state.
pub trait Strategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Bracket levels the simulator should apply to this strategy's signals.
    fn bracket(&self, _params: &StrategyParams) -> BracketConfig {
        BracketConfig::default()
    }

    fn run(
        &self,
        candles: &[Candle],
        capital: f64,
        params: &StrategyParams,
    ) -> Result<StrategyOutput, QuantgateError>;
}

#[derive(Debug, Clone)]
pub struct RuleStrategy {
    pub name: String,
    pub description: String,
    pub entry_long: Rule,
    pub exit_long: Rule,
    pub bracket: BracketConfig,
    pub atr_period: usize,
}

impl Strategy for RuleStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn bracket(&self, params: &StrategyParams) -> BracketConfig {
        let pick = |key: &str, base: Option<f64>| {
            params
                .overrides
                .get(key)
                .copied()
                .map(|v| Some(v).filter(|v| *v > 0.0))
                .unwrap_or(base)
        };
        BracketConfig {
            stop_loss_atr_mult: pick("stop_loss_atr_mult", self.bracket.stop_loss_atr_mult),
            take_profit_atr_mult: pick("take_profit_atr_mult", self.bracket.take_profit_atr_mult),
        }
    }

    fn run(
        &self,
        candles: &[Candle],
        _capital: f64,
        params: &StrategyParams,
    ) -> Result<StrategyOutput, QuantgateError> {
        let indicators = compute_indicators([&self.entry_long, &self.exit_long], candles);
        let bracket = self.bracket(params);
        let atr = calculate_atr(candles, self.atr_period);

        let signals = (0..candles.len())
            .map(|i| {
                let defined = is_defined(&self.entry_long, &indicators, i)
                    && is_defined(&self.exit_long, &indicators, i)
                    && (!bracket.is_enabled() || atr[i].is_some());
                if !defined {
                    return None;
                }
                let exit = evaluate(&self.exit_long, candles, &indicators, i);
                let entry = evaluate(&self.entry_long, candles, &indicators, i);
                Some(if exit {
                    Signal::ExitLong
                } else if entry {
                    Signal::EnterLong
                } else {
                    Signal::Hold
                })
            })
            .collect();

        Ok(StrategyOutput::SignalTable(
            SignalTable::new(candles.to_vec(), signals).with_atr(atr),
        ))
    }
}

/// Returns a fixed pre-computed result for every symbol.
#[derive(Debug, Clone)]
pub struct FixedMetricsStrategy {
    pub name: String,
    pub metrics: RawMetrics,
}

impl Strategy for FixedMetricsStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        _candles: &[Candle],
        _capital: f64,
        _params: &StrategyParams,
    ) -> Result<StrategyOutput, QuantgateError> {
        Ok(StrategyOutput::RawMetrics(self.metrics.clone()))
    }
}

fn parse_rule(key: &str, text: &str) -> Result<Rule, QuantgateError> {
    rule_parser::parse(text).map_err(|e| {
        tracing::debug!("{}", e.display_with_context(text));
        QuantgateError::RuleParse(ParseError {
            message: format!("{key}: {}", e.message),
            position: e.position,
        })
    })
}

fn positive_mult(config: &dyn ConfigPort, key: &str) -> Result<Option<f64>, QuantgateError> {
    match config.get_string("strategy", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v > 0.0 && v.is_finite() => Ok(Some(v)),
            _ => Err(QuantgateError::ConfigInvalid {
                section: "strategy".into(),
                key: key.into(),
                reason: format!("{key} must be a positive number"),
            }),
        },
    }
}

pub fn build_rule_strategy(
    name: &str,
    config: &dyn ConfigPort,
) -> Result<RuleStrategy, QuantgateError> {
    let required = |key: &str| {
        config
            .get_string("strategy", key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| QuantgateError::ConfigMissing {
                section: "strategy".into(),
                key: key.into(),
            })
    };

    let entry_long = parse_rule("entry_long", &required("entry_long")?)?;
    let exit_long = parse_rule("exit_long", &required("exit_long")?)?;

    let atr_period = config.get_int("strategy", "atr_period", DEFAULT_ATR_PERIOD as i64);
    if atr_period < 1 {
        return Err(QuantgateError::ConfigInvalid {
            section: "strategy".into(),
            key: "atr_period".into(),
            reason: "atr_period must be at least 1".into(),
        });
    }

    Ok(RuleStrategy {
        name: name.to_string(),
        description: config
            .get_string("strategy", "description")
            .or_else(|| config.get_string("strategy", "name"))
            .unwrap_or_default(),
        entry_long,
        exit_long,
        bracket: BracketConfig {
            stop_loss_atr_mult: positive_mult(config, "stop_loss_atr_mult")?,
            take_profit_atr_mult: positive_mult(config, "take_profit_atr_mult")?,
        },
        atr_period: atr_period as usize,
    })
}

pub fn build_fixed_metrics_strategy(name: &str, config: &dyn ConfigPort) -> FixedMetricsStrategy {
    let metrics = config
        .section_entries("metrics")
        .into_iter()
        .fold(RawMetrics::new(), |raw, (key, value)| {
            let value = match value.trim().parse::<f64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(value),
            };
            raw.with(&key, value)
        });
    FixedMetricsStrategy {
        name: name.to_string(),
        metrics,
    }
}

/// Build a strategy from a parsed document. `name` is the deployment name;
/// a `name` key inside the document only serves as a fallback description.
pub fn build_strategy(
    name: &str,
    config: &dyn ConfigPort,
) -> Result<Arc<dyn Strategy>, QuantgateError> {
    if config.has_section("strategy") {
        Ok(Arc::new(build_rule_strategy(name, config)?))
    } else if config.has_section("metrics") {
        Ok(Arc::new(build_fixed_metrics_strategy(name, config)))
    } else {
        Err(QuantgateError::ConfigMissing {
            section: "strategy".into(),
            key: "entry_long".into(),
        })
    }
}

/// Load the currently deployed source of `name`.
pub fn load_deployed(
    store: &dyn DeploymentStore,
    loader: &dyn StrategyLoader,
    name: &str,
) -> Result<Arc<dyn Strategy>, QuantgateError> {
    let bytes = store
        .snapshot(name)?
        .ok_or_else(|| QuantgateError::StrategyExecution {
            strategy: name.to_string(),
            reason: "no deployed source".to_string(),
        })?;
    let code = String::from_utf8(bytes).map_err(|e| QuantgateError::StrategyExecution {
        strategy: name.to_string(),
        reason: format!("deployed source is not UTF-8: {e}"),
    })?;
    loader.load(name, &code)
}
