//! Rule AST for text-defined strategies.
//!
//! - `Operand`: what can be compared (price fields, constants, indicators)
//! - `Rule`: comparison and composite rules

use std::collections::BTreeSet;

use crate::domain::indicator::IndicatorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Volume,
    Constant(f64),
    Indicator(IndicatorKind),
}

impl Operand {
    fn collect_indicator(&self, out: &mut BTreeSet<IndicatorKind>) {
        if let Operand::Indicator(kind) = self {
            out.insert(*kind);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    CrossAbove { left: Operand, right: Operand },
    CrossBelow { left: Operand, right: Operand },
    Above { left: Operand, right: Operand },
    Below { left: Operand, right: Operand },
    Between {
        operand: Operand,
        lower: f64,
        upper: f64,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
}

impl Rule {
    /// Every indicator referenced anywhere in the rule tree.
    pub fn indicators(&self) -> BTreeSet<IndicatorKind> {
        let mut out = BTreeSet::new();
        self.collect_indicators(&mut out);
        out
    }

    fn collect_indicators(&self, out: &mut BTreeSet<IndicatorKind>) {
        match self {
            Rule::CrossAbove { left, right }
            | Rule::CrossBelow { left, right }
            | Rule::Above { left, right }
            | Rule::Below { left, right } => {
                left.collect_indicator(out);
                right.collect_indicator(out);
            }
            Rule::Between { operand, .. } => operand.collect_indicator(out),
            Rule::And(rules) | Rule::Or(rules) => {
                for rule in rules {
                    rule.collect_indicators(out);
                }
            }
            Rule::Not(rule) => rule.collect_indicators(out),
        }
    }

    /// Whether any node needs the previous bar.
    pub fn looks_back(&self) -> bool {
        match self {
            Rule::CrossAbove { .. } | Rule::CrossBelow { .. } => true,
            Rule::Above { .. } | Rule::Below { .. } | Rule::Between { .. } => false,
            Rule::And(rules) | Rule::Or(rules) => rules.iter().any(Rule::looks_back),
            Rule::Not(rule) => rule.looks_back(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_constant() {
        let c = Operand::Constant(100.5);
        assert_eq!(c, Operand::Constant(100.5));
        assert_ne!(c, Operand::Constant(99.0));
    }

    #[test]
    fn indicators_collected_through_composites() {
        let rule = Rule::And(vec![
            Rule::CrossAbove {
                left: Operand::Indicator(IndicatorKind::Sma(20)),
                right: Operand::Indicator(IndicatorKind::Sma(50)),
            },
            Rule::Not(Box::new(Rule::Between {
                operand: Operand::Indicator(IndicatorKind::Rsi(14)),
                lower: 70.0,
                upper: 100.0,
            })),
            Rule::Above {
                left: Operand::Close,
                right: Operand::Indicator(IndicatorKind::Sma(20)),
            },
        ]);
        let kinds: Vec<IndicatorKind> = rule.indicators().into_iter().collect();
        assert_eq!(
            kinds,
            vec![
                IndicatorKind::Sma(20),
                IndicatorKind::Sma(50),
                IndicatorKind::Rsi(14)
            ]
        );
    }

    #[test]
    fn looks_back_only_for_cross_rules() {
        let above = Rule::Above {
            left: Operand::Close,
            right: Operand::Constant(1.0),
        };
        assert!(!above.looks_back());
        let cross = Rule::CrossBelow {
            left: Operand::Close,
            right: Operand::Constant(1.0),
        };
        assert!(Rule::Or(vec![above, Rule::Not(Box::new(cross))]).looks_back());
    }
}
