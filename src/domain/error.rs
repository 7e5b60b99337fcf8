//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!("{input}\n{caret}\n{self}")
    }
}

/// Top-level error type for quantgate.
#[derive(Debug, thiserror::Error)]
pub enum QuantgateError {
    #[error("data error for {symbol}: {reason}")]
    Data { symbol: String, reason: String },

    #[error("strategy {strategy} failed: {reason}")]
    StrategyExecution { strategy: String, reason: String },

    #[error("strategy {strategy} timed out on {symbol} after {seconds}s")]
    Timeout {
        strategy: String,
        symbol: String,
        seconds: u64,
    },

    #[error("cannot resolve required field {field}")]
    Schema { field: String },

    #[error("deployment of {strategy} failed during {action}: {reason}")]
    ValidationInfrastructure {
        strategy: String,
        action: String,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&QuantgateError> for std::process::ExitCode {
    fn from(err: &QuantgateError) -> Self {
        let code: u8 = match err {
            QuantgateError::Io(_) | QuantgateError::Json(_) => 1,
            QuantgateError::ConfigParse { .. }
            | QuantgateError::ConfigMissing { .. }
            | QuantgateError::ConfigInvalid { .. } => 2,
            QuantgateError::ValidationInfrastructure { .. } => 3,
            QuantgateError::RuleParse(_) => 4,
            QuantgateError::Data { .. } => 5,
            QuantgateError::StrategyExecution { .. }
            | QuantgateError::Timeout { .. }
            | QuantgateError::Schema { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_offset() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("SMA(20");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "SMA(20");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn display_messages() {
        let err = QuantgateError::Timeout {
            strategy: "sniper".into(),
            symbol: "ETHUSDT".into(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "strategy sniper timed out on ETHUSDT after 30s");

        let err = QuantgateError::Schema {
            field: "trade_count".into(),
        };
        assert_eq!(err.to_string(), "cannot resolve required field trade_count");
    }
}
