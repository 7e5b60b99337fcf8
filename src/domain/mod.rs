//! Core domain types and logic.

pub mod candle;
pub mod config;
pub mod error;
pub mod executor;
pub mod indicator;
pub mod metrics;
pub mod normalizer;
pub mod position;
pub mod progressive;
pub mod record;
pub mod rule;
pub mod rule_eval;
pub mod rule_parser;
pub mod scorer;
pub mod signal;
pub mod simulator;
pub mod strategy;
pub mod validator;
