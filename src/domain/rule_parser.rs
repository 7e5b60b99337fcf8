//! Rule DSL parser.
//!
//! Recursive descent over the grammar below. Errors carry the character
//! offset of the offending token.
//!
//! ```text
//! rule     := CROSS_ABOVE(op, op) | CROSS_BELOW(op, op) | ABOVE(op, op)
//!           | BELOW(op, op) | BETWEEN(op, num, num)
//!           | AND(rule, rule, ...) | OR(rule, rule, ...) | NOT(rule)
//! op       := open | high | low | close | volume | num
//!           | SMA(int) | EMA(int) | RSI(int) | ATR(int)
//! ```

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::rule::{Operand, Rule};

#[derive(Clone, Copy)]
enum Comparison {
    CrossAbove,
    CrossBelow,
    Above,
    Below,
}

impl Comparison {
    const ALL: [(&'static str, Comparison); 4] = [
        ("CROSS_ABOVE", Comparison::CrossAbove),
        ("CROSS_BELOW", Comparison::CrossBelow),
        ("ABOVE", Comparison::Above),
        ("BELOW", Comparison::Below),
    ];

    fn build(self, left: Operand, right: Operand) -> Rule {
        match self {
            Comparison::CrossAbove => Rule::CrossAbove { left, right },
            Comparison::CrossBelow => Rule::CrossBelow { left, right },
            Comparison::Above => Rule::Above { left, right },
            Comparison::Below => Rule::Below { left, right },
        }
    }
}

const INDICATORS: [(&str, fn(usize) -> IndicatorKind); 4] = [
    ("SMA", IndicatorKind::Sma),
    ("EMA", IndicatorKind::Ema),
    ("RSI", IndicatorKind::Rsi),
    ("ATR", IndicatorKind::Atr),
];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_period(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }

        let num_str = &self.input[start..self.pos];
        match num_str.parse::<usize>() {
            Ok(0) => Err(ParseError {
                message: "period must be at least 1".to_string(),
                position: start,
            }),
            Ok(n) => Ok(n),
            Err(_) if num_str.is_empty() => Err(ParseError {
                message: "expected integer".to_string(),
                position: start,
            }),
            Err(_) => Err(ParseError {
                message: format!("invalid integer: {}", num_str),
                position: start,
            }),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            return Ok(Operand::Constant(self.parse_number()?));
        }

        let word = self.peek_word();
        let field = match word.as_str() {
            "open" => Some(Operand::Open),
            "high" => Some(Operand::High),
            "low" => Some(Operand::Low),
            "close" => Some(Operand::Close),
            "volume" => Some(Operand::Volume),
            _ => None,
        };
        if let Some(operand) = field {
            self.pos += word.len();
            return Ok(operand);
        }

        for (name, make) in INDICATORS {
            if self.consume_keyword(name) {
                self.expect_char('(')?;
                let period = self.parse_period()?;
                self.expect_char(')')?;
                return Ok(Operand::Indicator(make(period)));
            }
        }

        Err(self.error(format!("expected operand, found '{}'", word)))
    }

    fn parse_comparison(&mut self, kind: Comparison) -> Result<Rule, ParseError> {
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;
        Ok(kind.build(left, right))
    }

    fn parse_between(&mut self) -> Result<Rule, ParseError> {
        self.expect_char('(')?;
        let operand = self.parse_operand()?;
        self.expect_char(',')?;
        let lower = self.parse_number()?;
        self.expect_char(',')?;
        let upper = self.parse_number()?;
        self.expect_char(')')?;

        if lower > upper {
            return Err(self.error(format!(
                "BETWEEN lower bound {} exceeds upper bound {}",
                lower, upper
            )));
        }

        Ok(Rule::Between {
            operand,
            lower,
            upper,
        })
    }

    fn parse_rule_list(&mut self, keyword: &str) -> Result<Vec<Rule>, ParseError> {
        self.expect_char('(')?;

        let mut rules = vec![self.parse_rule()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            rules.push(self.parse_rule()?);
        }

        if rules.len() < 2 {
            return Err(self.error(format!("{} requires at least 2 rules", keyword)));
        }
        Ok(rules)
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();

        for (keyword, kind) in Comparison::ALL {
            if self.consume_keyword(keyword) {
                return self.parse_comparison(kind);
            }
        }
        if self.consume_keyword("BETWEEN") {
            return self.parse_between();
        }
        if self.consume_keyword("AND") {
            return Ok(Rule::And(self.parse_rule_list("AND")?));
        }
        if self.consume_keyword("OR") {
            return Ok(Rule::Or(self.parse_rule_list("OR")?));
        }
        if self.consume_keyword("NOT") {
            self.expect_char('(')?;
            let rule = self.parse_rule()?;
            self.expect_char(')')?;
            return Ok(Rule::Not(Box::new(rule)));
        }

        let word = self.peek_word();
        Err(self.error(format!("expected rule, found '{}'", word)))
    }

    fn parse(&mut self) -> Result<Rule, ParseError> {
        let rule = self.parse_rule()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after rule: '{}'",
                self.remaining()
            )));
        }
        Ok(rule)
    }
}

pub fn parse(input: &str) -> Result<Rule, ParseError> {
    Parser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_above() {
        let rule = parse("ABOVE(close, 100)").unwrap();
        assert!(matches!(
            rule,
            Rule::Above {
                left: Operand::Close,
                right: Operand::Constant(100.0)
            }
        ));
    }

    #[test]
    fn parse_below_with_indicators() {
        let rule = parse("BELOW(SMA(20), SMA(50))").unwrap();
        assert_eq!(
            rule,
            Rule::Below {
                left: Operand::Indicator(IndicatorKind::Sma(20)),
                right: Operand::Indicator(IndicatorKind::Sma(50)),
            }
        );
    }

    #[test]
    fn parse_cross_rules() {
        assert!(matches!(
            parse("CROSS_ABOVE(SMA(20), SMA(50))").unwrap(),
            Rule::CrossAbove { .. }
        ));
        assert!(matches!(
            parse("CROSS_BELOW(close, EMA(200))").unwrap(),
            Rule::CrossBelow { .. }
        ));
    }

    #[test]
    fn parse_between() {
        let rule = parse("BETWEEN(RSI(14), 30, 70)").unwrap();
        match rule {
            Rule::Between {
                operand,
                lower,
                upper,
            } => {
                assert_eq!(operand, Operand::Indicator(IndicatorKind::Rsi(14)));
                assert!((lower - 30.0).abs() < f64::EPSILON);
                assert!((upper - 70.0).abs() < f64::EPSILON);
            }
            _ => panic!("expected Between rule"),
        }
    }

    #[test]
    fn parse_composites() {
        match parse("AND(ABOVE(close, 100), BELOW(close, 150), ABOVE(volume, 0))").unwrap() {
            Rule::And(rules) => assert_eq!(rules.len(), 3),
            _ => panic!("expected And rule"),
        }
        match parse("OR(ABOVE(close, 100), BELOW(close, 50))").unwrap() {
            Rule::Or(rules) => assert_eq!(rules.len(), 2),
            _ => panic!("expected Or rule"),
        }
        assert!(matches!(
            parse("NOT(AND(OR(ABOVE(close, 100), BELOW(close, 50)), ABOVE(ATR(14), 1)))").unwrap(),
            Rule::Not(_)
        ));
    }

    #[test]
    fn parse_whitespace_handling() {
        let rule = parse("  ABOVE  (  close  ,  100  )  ").unwrap();
        assert!(matches!(rule, Rule::Above { .. }));
    }

    #[test]
    fn parse_price_fields() {
        for (input, expected) in [
            ("ABOVE(open, 100)", Operand::Open),
            ("ABOVE(high, 100)", Operand::High),
            ("ABOVE(low, 100)", Operand::Low),
            ("ABOVE(close, 100)", Operand::Close),
            ("ABOVE(volume, 100)", Operand::Volume),
        ] {
            match parse(input).unwrap() {
                Rule::Above { left, .. } => assert_eq!(left, expected),
                _ => panic!("expected Above rule"),
            }
        }
    }

    #[test]
    fn parse_negative_and_float_numbers() {
        match parse("ABOVE(close, -100.5)").unwrap() {
            Rule::Above {
                right: Operand::Constant(v),
                ..
            } => assert!((v + 100.5).abs() < f64::EPSILON),
            _ => panic!("expected Above rule"),
        }
    }

    #[test]
    fn error_unexpected_token() {
        let err = parse("ABOVE(close, )").unwrap_err();
        assert!(err.message.contains("expected"));
        assert_eq!(err.position, 13);
    }

    #[test]
    fn error_missing_paren() {
        let err = parse("ABOVE(close, 100").unwrap_err();
        assert!(err.message.contains("expected ')'"));
        assert_eq!(err.position, 16);
    }

    #[test]
    fn error_invalid_rule() {
        let err = parse("INVALID(close, 100)").unwrap_err();
        assert!(err.message.contains("expected rule"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_unknown_indicator() {
        let err = parse("ABOVE(MACD(12), 0)").unwrap_err();
        assert!(err.message.contains("expected operand"));
        assert_eq!(err.position, 6);
    }

    #[test]
    fn error_zero_period() {
        let err = parse("ABOVE(SMA(0), 1)").unwrap_err();
        assert!(err.message.contains("period"));
        assert_eq!(err.position, 10);
    }

    #[test]
    fn error_inverted_between() {
        let err = parse("BETWEEN(close, 10, 5)").unwrap_err();
        assert!(err.message.contains("exceeds"));
    }

    #[test]
    fn error_trailing_input() {
        let err = parse("ABOVE(close, 100) garbage").unwrap_err();
        assert!(err.message.contains("unexpected input"));
        assert_eq!(err.position, 18);
    }

    #[test]
    fn error_missing_comma() {
        let err = parse("ABOVE(close 100)").unwrap_err();
        assert!(err.message.contains("expected ','"));
    }

    #[test]
    fn error_single_rule_composites() {
        let err = parse("AND(ABOVE(close, 100))").unwrap_err();
        assert!(err.message.contains("AND requires at least 2 rules"));
        let err = parse("OR(ABOVE(close, 100))").unwrap_err();
        assert!(err.message.contains("OR requires at least 2 rules"));
    }

    #[test]
    fn error_display_with_context() {
        let input = "CROSS_ABOVE(SMA(20), , SMA(50))";
        let err = parse(input).unwrap_err();
        let ctx = err.display_with_context(input);
        assert!(ctx.contains("^"));
        assert!(ctx.contains("position"));
    }

    #[test]
    fn case_sensitive_keywords() {
        let err = parse("above(close, 100)").unwrap_err();
        assert!(err.message.contains("expected rule"));
    }

    #[test]
    fn error_empty_input() {
        let err = parse("   ").unwrap_err();
        assert!(err.message.contains("expected rule"));
        assert_eq!(err.position, 3);
    }
}
