//! Error types for causal test execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::PositivityReport;

/// Why identification produced no estimand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoEstimandReason {
    /// A treatment has no directed path to any outcome.
    NoCausalPath,
    /// Neither back-door, front-door nor instrumental identification applies.
    NoStrategyApplies,
}

impl std::fmt::Display for NoEstimandReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCausalPath => f.write_str("treatment has no directed path to any outcome"),
            Self::NoStrategyApplies => {
                f.write_str("no back-door, front-door or instrumental identification applies")
            }
        }
    }
}

/// Numerical cause of an estimation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EstimationFailureCause {
    /// Design matrix (or a normal-equations system) is rank deficient.
    Singular(String),
    /// Iterative or resampling fit did not converge.
    NonConvergence(String),
    /// Too few complete rows for the requested model.
    InsufficientData(String),
    /// The estimator cannot handle the estimand or value types.
    Unsupported(String),
    /// Deadline exceeded during resampling.
    Timeout {
        /// Wall time spent before giving up (seconds).
        elapsed_secs: f64,
        /// Resamples finished before the deadline.
        completed: usize,
        /// Resamples requested.
        requested: usize,
    },
}

impl std::fmt::Display for EstimationFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singular(msg) => write!(f, "singular design: {msg}"),
            Self::NonConvergence(msg) => write!(f, "non-convergence: {msg}"),
            Self::InsufficientData(msg) => write!(f, "insufficient data: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::Timeout { elapsed_secs, completed, requested } => write!(
                f,
                "timeout after {elapsed_secs:.3}s ({completed}/{requested} resamples completed)"
            ),
        }
    }
}

/// Causal testing error type
#[derive(Error, Debug)]
pub enum Error {
    /// A variable with this name is already registered.
    #[error("duplicate variable: {0}")]
    DuplicateVariable(String),

    /// The name does not refer to a registered variable.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Inserting `from -> to` would close a directed cycle.
    #[error("edge {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Edge source.
        from: String,
        /// Edge target.
        to: String,
    },

    /// Identification failed; terminal for this graph.
    #[error("no valid estimand for {treatments:?} -> {outcomes:?}: {reason}")]
    NoValidEstimand {
        /// Treatment variables.
        treatments: Vec<String>,
        /// Outcome variables.
        outcomes: Vec<String>,
        /// Failure reason.
        reason: NoEstimandReason,
    },

    /// Columns referenced by the estimand are absent from the dataset.
    #[error("missing columns: {}", .0.join(", "))]
    MissingColumn(Vec<String>),

    /// Some strata lack treated or control rows.
    #[error("positivity violation: {0}")]
    PositivityViolation(PositivityReport),

    /// Numerical failure while fitting or resampling.
    #[error("estimation failure: {0}")]
    EstimationFailure(EstimationFailureCause),

    /// Malformed arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a singular-design estimation failure.
    pub fn singular(msg: impl Into<String>) -> Self {
        Self::EstimationFailure(EstimationFailureCause::Singular(msg.into()))
    }

    /// Shorthand for an insufficient-data estimation failure.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::EstimationFailure(EstimationFailureCause::InsufficientData(msg.into()))
    }

    /// Shorthand for an unsupported-input estimation failure.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::EstimationFailure(EstimationFailureCause::Unsupported(msg.into()))
    }

    /// `true` for failures a caller can address by supplying more or different data.
    pub fn is_data_recoverable(&self) -> bool {
        matches!(self, Self::MissingColumn(_) | Self::PositivityViolation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_message_lists_every_name() {
        let err = Error::MissingColumn(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "missing columns: a, b");
        assert!(err.is_data_recoverable());
    }

    #[test]
    fn timeout_is_distinguishable_from_singular() {
        let t = EstimationFailureCause::Timeout { elapsed_secs: 1.5, completed: 3, requested: 10 };
        let s = EstimationFailureCause::Singular("X'X".into());
        assert_ne!(t, s);
        assert!(t.to_string().contains("3/10"));
        assert!(!Error::EstimationFailure(t).is_data_recoverable());
    }
}
