//! Error types for agent invocations

use crate::invoker::Role;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tradeflow-core
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised at the invocation boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The invocation endpoint was unreachable or answered with an error
    #[error("transport failure: {0}")]
    Transport(String),

    /// The invocation did not complete before its deadline
    #[error("{role} invocation timed out after {after:?}")]
    Timeout {
        role: Role,
        after: Duration,
    },

    /// The run owning the invocation was cancelled
    #[error("invocation cancelled")]
    Cancelled,

    /// A conversational session could not be established
    #[error("session setup failed for {key}: {reason}")]
    SessionSetup {
        key: String,
        reason: String,
    },
}

impl Error {
    /// Whether this failure must end the whole run.
    ///
    /// Only plain transport failures can be absorbed by a sequential stage;
    /// its next step still has something to work with.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }

    /// Whether this failure is a deadline miss.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "transport failure: connection refused");

        let err = Error::Timeout {
            role: Role::DebateJudge,
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "debate_judge invocation timed out after 5s");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::Transport("x".to_string()).is_fatal());
        assert!(Error::Cancelled.is_fatal());
        assert!(
            Error::SessionSetup {
                key: "k".to_string(),
                reason: "busy".to_string(),
            }
            .is_fatal()
        );

        let timeout = Error::Timeout {
            role: Role::Trader,
            after: Duration::from_millis(10),
        };
        assert!(timeout.is_fatal());
        assert!(timeout.is_timeout());
    }
}
