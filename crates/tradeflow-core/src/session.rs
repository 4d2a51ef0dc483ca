//! Run identifiers and session keys
//!
//! A session key scopes one isolated conversational state. Keys are composed
//! from the role, the subject, the run identifier and an optional sequence
//! position, so two invocations can only share a key when they are the same
//! step of the same run.

use crate::invoker::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh run identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite session key: role + subject + run + sequence position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    role: Role,
    subject: String,
    run_id: RunId,
    sequence: Option<u32>,
}

impl SessionKey {
    /// Key for a role that is invoked once per run
    pub fn new(role: Role, subject: impl Into<String>, run_id: RunId) -> Self {
        Self {
            role,
            subject: subject.into(),
            run_id,
            sequence: None,
        }
    }

    /// Same key, pinned to a position in a sequential chain
    pub fn at(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.role, self.subject, self.run_id)?;
        if let Some(seq) = self.sequence {
            write!(f, "#{seq}")?;
        }
        Ok(())
    }
}
