//! Trade simulation over a signal table.
//!
//! Single asset, long only, at most one open position. On a bar with an open
//! position the exit checks run in this order:
//! 1. stop-loss (bar low <= stop), filled at the stop level
//! 2. take-profit (bar high >= target), filled at the target level
//! 3. exit-long signal, filled at the bar close
//!
//! A position is never checked for exit on the bar that opened it. Sizing
//! compounds: each trade applies its full return to the current equity.

use chrono::NaiveDateTime;

use super::candle::Candle;
use super::position::{ExitReason, Position, Trade};
use super::signal::{Signal, SignalTable};

/// ATR multiples for bracket levels. `None` disables that side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BracketConfig {
    pub stop_loss_atr_mult: Option<f64>,
    pub take_profit_atr_mult: Option<f64>,
}

impl BracketConfig {
    pub fn is_enabled(&self) -> bool {
        self.stop_loss_atr_mult.is_some() || self.take_profit_atr_mult.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub bracket: BracketConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_capital: 100.0,
            bracket: BracketConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
}

/// Reject tables whose per-bar columns do not line up with the candles.
pub fn check_shape(table: &SignalTable) -> Result<(), String> {
    if table.is_empty() {
        return Err("signal table has no candles".into());
    }
    if table.signals.len() != table.len() {
        return Err(format!(
            "signal column has {} rows, expected {}",
            table.signals.len(),
            table.len()
        ));
    }
    if table.atr.len() != table.len() {
        return Err(format!(
            "atr column has {} rows, expected {}",
            table.atr.len(),
            table.len()
        ));
    }
    Ok(())
}

pub fn simulate(table: &SignalTable, config: &SimulationConfig) -> SimulationResult {
    let mut equity = config.initial_capital;
    let mut position: Option<Position> = None;
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(table.len());

    for (i, (candle, signal)) in table.candles.iter().zip(&table.signals).enumerate() {
        let Some(signal) = signal else {
            continue;
        };

        match position.take() {
            None => {
                if *signal == Signal::EnterLong {
                    let atr = table.atr.get(i).copied().flatten();
                    position = Some(open_position(candle, atr, &config.bracket));
                }
            }
            Some(pos) => match exit_trigger(&pos, candle, *signal) {
                Some((price, reason)) => {
                    trades.push(close_position(
                        &pos,
                        price,
                        candle.timestamp,
                        reason,
                        &mut equity,
                    ));
                }
                None => position = Some(pos),
            },
        }

        equity_curve.push(mark_to_market(equity, position.as_ref(), candle.close));
    }

    if let (Some(pos), Some(last)) = (position.take(), table.candles.last()) {
        trades.push(close_position(
            &pos,
            last.close,
            last.timestamp,
            ExitReason::EndOfData,
            &mut equity,
        ));
        if let Some(point) = equity_curve.last_mut() {
            *point = equity;
        }
    }

    SimulationResult {
        initial_capital: config.initial_capital,
        final_equity: equity,
        trades,
        equity_curve,
    }
}

fn open_position(candle: &Candle, atr: Option<f64>, bracket: &BracketConfig) -> Position {
    let entry_price = candle.close;
    let atr = atr.filter(|a| a.is_finite());
    Position {
        entry_price,
        entry_time: candle.timestamp,
        stop_loss: atr
            .zip(bracket.stop_loss_atr_mult)
            .map(|(a, mult)| entry_price - mult * a),
        take_profit: atr
            .zip(bracket.take_profit_atr_mult)
            .map(|(a, mult)| entry_price + mult * a),
    }
}

fn exit_trigger(pos: &Position, candle: &Candle, signal: Signal) -> Option<(f64, ExitReason)> {
    if let Some(stop) = pos.stop_loss.filter(|_| pos.should_stop_loss(candle.low)) {
        return Some((stop, ExitReason::StopLoss));
    }
    if let Some(target) = pos
        .take_profit
        .filter(|_| pos.should_take_profit(candle.high))
    {
        return Some((target, ExitReason::TakeProfit));
    }
    if signal == Signal::ExitLong {
        return Some((candle.close, ExitReason::Signal));
    }
    None
}

fn close_position(
    pos: &Position,
    exit_price: f64,
    exit_time: NaiveDateTime,
    reason: ExitReason,
    equity: &mut f64,
) -> Trade {
    let return_pct = pos.return_at(exit_price);
    let pnl = *equity * return_pct;
    *equity += pnl;
    Trade {
        entry_time: pos.entry_time,
        exit_time,
        entry_price: pos.entry_price,
        exit_price,
        pnl,
        return_pct,
        exit_reason: reason,
    }
}

fn mark_to_market(equity: f64, position: Option<&Position>, close: f64) -> f64 {
    match position {
        Some(pos) => equity * close / pos.entry_price,
        None => equity,
    }
}
