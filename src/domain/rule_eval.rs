//! Rule evaluation against candles and pre-computed indicator series.
//!
//! # Evaluation Semantics
//!
//! - Comparison rules: evaluate at the given bar index
//! - `CROSS_ABOVE`/`CROSS_BELOW`: compare with the previous bar, `false` at index 0
//! - `AND`: short-circuits on first `false`
//! - `OR`: short-circuits on first `true`
//!
//! An undefined indicator value resolves to NaN, which makes every comparison
//! false. Callers that need to tell warm-up apart from a false rule use
//! [`is_defined`].

use std::collections::HashMap;

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorKind, IndicatorSeries};
use crate::domain::rule::{Operand, Rule};

pub type IndicatorCache = HashMap<IndicatorKind, IndicatorSeries>;

pub fn evaluate(
    rule: &Rule,
    candles: &[Candle],
    indicators: &IndicatorCache,
    bar_index: usize,
) -> bool {
    let value = |operand: &Operand, index: usize| resolve_operand(operand, candles, indicators, index);

    match rule {
        Rule::CrossAbove { left, right } => {
            if bar_index == 0 {
                return false;
            }
            value(left, bar_index) > value(right, bar_index)
                && value(left, bar_index - 1) <= value(right, bar_index - 1)
        }
        Rule::CrossBelow { left, right } => {
            if bar_index == 0 {
                return false;
            }
            value(left, bar_index) < value(right, bar_index)
                && value(left, bar_index - 1) >= value(right, bar_index - 1)
        }
        Rule::Above { left, right } => value(left, bar_index) > value(right, bar_index),
        Rule::Below { left, right } => value(left, bar_index) < value(right, bar_index),
        Rule::Between {
            operand,
            lower,
            upper,
        } => {
            let val = value(operand, bar_index);
            val >= *lower && val <= *upper
        }
        Rule::And(rules) => rules
            .iter()
            .all(|r| evaluate(r, candles, indicators, bar_index)),
        Rule::Or(rules) => rules
            .iter()
            .any(|r| evaluate(r, candles, indicators, bar_index)),
        Rule::Not(rule) => !evaluate(rule, candles, indicators, bar_index),
    }
}

/// True when every indicator the rule reads at `bar_index` has a value,
/// including the previous bar for cross rules.
pub fn is_defined(rule: &Rule, indicators: &IndicatorCache, bar_index: usize) -> bool {
    let defined_at = |operand: &Operand, index: usize| match operand {
        Operand::Indicator(kind) => indicator_value(kind, indicators, index).is_some(),
        _ => true,
    };

    match rule {
        Rule::CrossAbove { left, right } | Rule::CrossBelow { left, right } => {
            bar_index > 0
                && defined_at(left, bar_index)
                && defined_at(right, bar_index)
                && defined_at(left, bar_index - 1)
                && defined_at(right, bar_index - 1)
        }
        Rule::Above { left, right } | Rule::Below { left, right } => {
            defined_at(left, bar_index) && defined_at(right, bar_index)
        }
        Rule::Between { operand, .. } => defined_at(operand, bar_index),
        Rule::And(rules) | Rule::Or(rules) => {
            rules.iter().all(|r| is_defined(r, indicators, bar_index))
        }
        Rule::Not(rule) => is_defined(rule, indicators, bar_index),
    }
}

/// Compute every series the rules reference, once per indicator.
pub fn compute_indicators<'a>(
    rules: impl IntoIterator<Item = &'a Rule>,
    candles: &[Candle],
) -> IndicatorCache {
    let mut cache = IndicatorCache::new();
    for rule in rules {
        for kind in rule.indicators() {
            cache
                .entry(kind)
                .or_insert_with(|| kind.compute(candles));
        }
    }
    cache
}

fn indicator_value(kind: &IndicatorKind, indicators: &IndicatorCache, index: usize) -> Option<f64> {
    indicators.get(kind)?.get(index).copied().flatten()
}

fn resolve_operand(
    operand: &Operand,
    candles: &[Candle],
    indicators: &IndicatorCache,
    bar_index: usize,
) -> f64 {
    let Some(candle) = candles.get(bar_index) else {
        return f64::NAN;
    };
    match operand {
        Operand::Open => candle.open,
        Operand::High => candle.high,
        Operand::Low => candle.low,
        Operand::Close => candle.close,
        Operand::Volume => candle.volume,
        Operand::Constant(v) => *v,
        Operand::Indicator(kind) => indicator_value(kind, indicators, bar_index).unwrap_or(f64::NAN),
    }
}
