use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Syntax error from the front end. Execution never starts; the engine
/// surfaces it as the first (and only) `CONSOLE_ERROR` step of the trace.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("SyntaxError: {message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Everything that can go wrong at run time. Each kind surfaces as a
/// `CONSOLE_ERROR` step plus an entry in `RunOutcome::errors`; none of
/// them aborts the host.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RuntimeError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    /// A user `throw` that no `try/catch` consumed, stringified.
    #[error("Uncaught {0}")]
    Uncaught(String),

    /// The outer loop iteration cap or per-drain cap was hit. The partial
    /// trace up to that point is still returned.
    #[error("Scheduler overflow: {0}")]
    SchedulerOverflow(String),
}

impl RuntimeError {
    /// Engine-raised errors travel through the interpreter as thrown
    /// string values ("TypeError: …"), so an uncaught value classifies
    /// back into its kind by prefix.
    pub(crate) fn classify_thrown(text: &str) -> RuntimeError {
        if let Some(rest) = text.strip_prefix("ReferenceError: ") {
            RuntimeError::Reference(rest.to_string())
        } else if let Some(rest) = text.strip_prefix("TypeError: ") {
            RuntimeError::Type(rest.to_string())
        } else if let Some(rest) = text.strip_prefix("RangeError: ") {
            RuntimeError::Range(rest.to_string())
        } else {
            RuntimeError::Uncaught(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_engine_prefixes() {
        assert_eq!(
            RuntimeError::classify_thrown("TypeError: x is not a function"),
            RuntimeError::Type("x is not a function".into())
        );
        assert_eq!(
            RuntimeError::classify_thrown("ReferenceError: y is not defined"),
            RuntimeError::Reference("y is not defined".into())
        );
        assert_eq!(
            RuntimeError::classify_thrown("boom"),
            RuntimeError::Uncaught("boom".into())
        );
    }

    #[test]
    fn parse_error_display_carries_position() {
        let err = ParseError {
            message: "Unexpected token ')'".into(),
            line: 3,
            column: 7,
        };
        assert_eq!(
            err.to_string(),
            "SyntaxError: Unexpected token ')' (line 3, column 7)"
        );
    }
}
