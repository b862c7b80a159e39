//! Engine error taxonomy.

use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse error category, used by boundary layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Ambiguity,
    Convergence,
    ConcurrencyTimeout,
    InvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Ambiguity => "ambiguity",
            ErrorKind::Convergence => "convergence",
            ErrorKind::ConcurrencyTimeout => "concurrency_timeout",
            ErrorKind::InvariantViolation => "invariant_violation",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {what}: {reason}")]
    Validation { what: &'static str, reason: String },

    #[error("unknown prefix `{prefix}` in `{field}`")]
    UnknownPrefix { prefix: String, field: String },

    #[error("inference rule not found: {0}")]
    UnknownRule(String),

    #[error("label `{label}` matched {matches} nodes via `{predicate}` (expected exactly one)")]
    Ambiguous {
        label: String,
        predicate: String,
        matches: usize,
    },

    #[error("rule `{rule}` did not converge within {iterations} iterations")]
    Convergence { rule: String, iterations: usize },

    #[error("timed out after {waited:?} waiting for the lock on graph `{graph}`")]
    LockTimeout { graph: String, waited: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("index invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub fn validation(what: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            what,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } | Error::UnknownPrefix { .. } | Error::UnknownRule(_) => {
                ErrorKind::Validation
            }
            Error::Ambiguous { .. } => ErrorKind::Ambiguity,
            Error::Convergence { .. } => ErrorKind::Convergence,
            Error::LockTimeout { .. } | Error::Cancelled => ErrorKind::ConcurrencyTimeout,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }
}
