//! Performance metrics derived from a simulation.
//!
//! Rates and drawdown are fractions in [0, 1]; `roi` is a percentage.

use serde::{Deserialize, Serialize};

use super::position::Trade;
use super::simulator::SimulationResult;

/// Number of trades carried in the externally reported trade list.
pub const REPORTED_TRADES_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub success: bool,
    pub total_trades: usize,
    pub profitable_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_profit: f64,
    #[serde(deserialize_with = "super::record::null_as_infinity")]
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub final_equity: f64,
    pub initial_capital: f64,
    pub roi: f64,
    pub trades: Vec<Trade>,
}

impl BacktestMetrics {
    pub fn compute(result: &SimulationResult) -> Self {
        let trades = &result.trades;
        let initial_capital = result.initial_capital;
        let final_equity = result.final_equity;

        let mut profitable_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut total_profit = 0.0_f64;
        let mut total_loss = 0.0_f64;

        for trade in trades {
            if trade.pnl > 0.0 {
                profitable_trades += 1;
                total_profit += trade.pnl;
            } else if trade.pnl < 0.0 {
                losing_trades += 1;
                total_loss += trade.pnl.abs();
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            profitable_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let roi = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        BacktestMetrics {
            success: true,
            total_trades,
            profitable_trades,
            losing_trades,
            win_rate,
            total_profit,
            total_loss,
            net_profit: total_profit - total_loss,
            profit_factor: profit_factor(total_profit, total_loss),
            max_drawdown: max_drawdown(&result.equity_curve),
            sharpe_ratio: trade_sharpe(trades),
            final_equity,
            initial_capital,
            roi,
            trades: trades.iter().take(REPORTED_TRADES_LIMIT).cloned().collect(),
        }
    }
}

/// Gross wins over gross losses; infinite when there are wins but no losses.
pub fn profit_factor(total_profit: f64, total_loss: f64) -> f64 {
    if total_loss > 0.0 {
        total_profit / total_loss
    } else if total_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}

/// Mean over population stdev of per-trade returns. Not annualized.
pub fn trade_sharpe(trades: &[Trade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }

    let n = trades.len() as f64;
    let mean = trades.iter().map(|t| t.return_pct).sum::<f64>() / n;
    let variance = trades
        .iter()
        .map(|t| (t.return_pct - mean).powi(2))
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 { mean / stddev } else { 0.0 }
}
