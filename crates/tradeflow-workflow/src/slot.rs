//! Text-or-failure values carried between stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output of one producer or agent turn
///
/// A failure is kept as its own variant all the way to the result. It only
/// turns into text when a prompt is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Filled(String),
    Failed { reason: String },
}

impl Slot {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Filled(text) => Some(text),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Filled(_) => None,
            Self::Failed { reason } => Some(reason),
        }
    }

    /// Prompt-ready rendering, with an explicit marker for failures
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filled(text) => f.write_str(text),
            Self::Failed { reason } => write!(f, "[unavailable: {reason}]"),
        }
    }
}

impl<E: fmt::Display> From<std::result::Result<String, E>> for Slot {
    fn from(result: std::result::Result<String, E>) -> Self {
        match result {
            Ok(text) => Self::Filled(text),
            Err(err) => Self::failed(err.to_string()),
        }
    }
}
