//! Error types for workflow runs

use std::time::Duration;
use thiserror::Error;
use tradeflow_core::Role;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Failures that end a run
///
/// Anything not listed here is absorbed by the stage that hit it and shows
/// up as a failed slot in the result instead.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A conversational session could not be opened
    #[error("session setup failed for {key}: {reason}")]
    SessionSetup { key: String, reason: String },

    /// A sequential stage missed its invocation deadline
    #[error("{role} timed out after {after:?}")]
    Timeout { role: Role, after: Duration },

    /// The run was cancelled by its owner
    #[error("run cancelled")]
    Cancelled,

    /// A transport failure in a stage that cannot continue without the text
    #[error("{stage} failed: {reason}")]
    Transport { stage: &'static str, reason: String },

    /// The trader's answer did not end with BUY, HOLD or SELL
    #[error("unparseable decision: no BUY/HOLD/SELL in trailing token of {excerpt:?}")]
    UnparseableDecision { excerpt: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Blocking entry point could not start its runtime
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl WorkflowError {
    /// Attach a stage name to a transport failure
    pub(crate) fn in_stage(err: tradeflow_core::Error, stage: &'static str) -> Self {
        match err {
            tradeflow_core::Error::Transport(reason) => Self::Transport { stage, reason },
            other => other.into(),
        }
    }
}

impl From<tradeflow_core::Error> for WorkflowError {
    fn from(err: tradeflow_core::Error) -> Self {
        match err {
            tradeflow_core::Error::Transport(reason) => Self::Transport {
                stage: "invocation",
                reason,
            },
            tradeflow_core::Error::Timeout { role, after } => Self::Timeout { role, after },
            tradeflow_core::Error::Cancelled => Self::Cancelled,
            tradeflow_core::Error::SessionSetup { key, reason } => {
                Self::SessionSetup { key, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_core_error() {
        let err: WorkflowError = tradeflow_core::Error::Cancelled.into();
        assert!(matches!(err, WorkflowError::Cancelled));

        let err = WorkflowError::in_stage(
            tradeflow_core::Error::Transport("502".to_string()),
            "decision",
        );
        assert_eq!(err.to_string(), "decision failed: 502");

        let err = WorkflowError::in_stage(
            tradeflow_core::Error::Timeout {
                role: Role::BearResearcher,
                after: Duration::from_secs(3),
            },
            "debate",
        );
        assert_eq!(err.to_string(), "bear_researcher timed out after 3s");
    }
}
