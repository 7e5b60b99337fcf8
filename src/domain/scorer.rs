//! Asset, strategy and approval scoring.
//!
//! Records carry fractions; the asset score is defined on a 0-100 scale for
//! win rate and drawdown, so the conversion happens here and nowhere else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::record::{MetricsRecord, StrategyRunResult};

/// Minimum trades for a run to count toward strategy scoring.
pub const MIN_TRADES: usize = 30;

/// Drawdown above this fraction is flagged in reports.
pub const MAX_DD_ACCEPTABLE: f64 = 0.15;

/// Final score of a strategy with no scored asset.
pub const REJECTED_SCORE: f64 = -999.0;

/// Informational penalty per negative asset in rankings.
pub const NEGATIVE_ASSET_PENALTY: f64 = 5.0;

/// `profit_pct + win_rate% * 0.3 - max_drawdown% * 1.2`, or `None` below
/// [`MIN_TRADES`].
pub fn asset_score(record: &MetricsRecord) -> Option<f64> {
    if record.trade_count < MIN_TRADES {
        return None;
    }
    let win_rate_pct = record.win_rate * 100.0;
    let max_drawdown_pct = record.max_drawdown * 100.0;
    Some(record.profit_pct + win_rate_pct * 0.3 - max_drawdown_pct * 1.2)
}

/// Mean of the scores minus half the magnitude of every negative score.
pub fn strategy_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return REJECTED_SCORE;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let negative: f64 = scores.iter().filter(|s| **s < 0.0).map(|s| s.abs()).sum();
    mean - 0.5 * negative
}

/// Score out of 100 used by the validator, rounded to one decimal.
pub fn approval_score(record: &MetricsRecord) -> f64 {
    let win_rate = record.win_rate * 40.0;
    let profit = record.profit_pct.clamp(0.0, 100.0) * 0.3;
    let drawdown = (1.0 - record.max_drawdown) * 20.0;
    let trades = (record.trade_count as f64 / MIN_TRADES as f64).min(1.0) * 10.0;
    round_to(win_rate + profit + drawdown + trades, 1)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStatus {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRanking {
    pub strategy: String,
    pub final_score: f64,
    pub valid_assets: usize,
    pub total_assets: usize,
    pub avg_profit: f64,
    pub avg_win_rate: f64,
    pub avg_drawdown: f64,
    pub negative_assets: usize,
    pub penalty: f64,
    pub status: RankingStatus,
}

impl StrategyRanking {
    pub fn from_results(strategy: &str, results: &[StrategyRunResult], total_assets: usize) -> Self {
        let scored: Vec<(&MetricsRecord, f64)> = results
            .iter()
            .filter_map(|r| r.score.map(|s| (&r.metrics, s)))
            .collect();
        let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
        let final_score = strategy_score(&scores);
        let negative_assets = scores.iter().filter(|s| **s < 0.0).count();

        let mean = |f: fn(&MetricsRecord) -> f64| {
            if scored.is_empty() {
                0.0
            } else {
                scored.iter().map(|(m, _)| f(m)).sum::<f64>() / scored.len() as f64
            }
        };

        StrategyRanking {
            strategy: strategy.to_string(),
            final_score,
            valid_assets: scored.len(),
            total_assets,
            avg_profit: mean(|m| m.profit_pct),
            avg_win_rate: mean(|m| m.win_rate),
            avg_drawdown: mean(|m| m.max_drawdown),
            negative_assets,
            penalty: negative_assets as f64 * NEGATIVE_ASSET_PENALTY,
            status: if final_score >= 0.0 {
                RankingStatus::Approved
            } else {
                RankingStatus::Rejected
            },
        }
    }
}

/// Rank strategies in `order`, best first. Ties keep `order`.
///
/// Strategies without any results so far are skipped.
pub fn rank_strategies(
    order: &[String],
    results: &BTreeMap<String, Vec<StrategyRunResult>>,
    total_assets: usize,
) -> Vec<StrategyRanking> {
    let mut rankings: Vec<StrategyRanking> = order
        .iter()
        .filter_map(|name| {
            results
                .get(name)
                .map(|r| StrategyRanking::from_results(name, r, total_assets))
        })
        .collect();
    rankings.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    rankings
}

/// A positively scored (strategy, symbol) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub strategy: String,
    pub symbol: String,
    pub score: f64,
    pub profit_pct: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
}

impl Combination {
    pub fn drawdown_acceptable(&self) -> bool {
        self.max_drawdown <= MAX_DD_ACCEPTABLE
    }
}

/// The `n` best positively scored pairs across all strategies.
pub fn top_combinations(
    results: &BTreeMap<String, Vec<StrategyRunResult>>,
    n: usize,
) -> Vec<Combination> {
    let mut combos: Vec<Combination> = results
        .iter()
        .flat_map(|(strategy, runs)| {
            runs.iter().filter_map(move |r| {
                r.score.filter(|s| *s > 0.0).map(|score| Combination {
                    strategy: strategy.clone(),
                    symbol: r.symbol.clone(),
                    score,
                    profit_pct: r.metrics.profit_pct,
                    win_rate: r.metrics.win_rate,
                    max_drawdown: r.metrics.max_drawdown,
                })
            })
        })
        .collect();
    combos.sort_by(|a, b| b.score.total_cmp(&a.score));
    combos.truncate(n);
    combos
}
