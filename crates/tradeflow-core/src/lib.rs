//! Core abstractions for tradeflow
//!
//! This crate defines the fundamental types shared by every stage of the
//! decision pipeline: the [`AgentInvoker`] capability, the roles it is
//! invoked with, collision-free [`SessionKey`]s, the per-run [`RunContext`]
//! and the transport-level [`Error`] taxonomy.

pub mod context;
pub mod error;
pub mod invoker;
pub mod session;

pub use context::{DEFAULT_INVOKE_TIMEOUT, RunContext};
pub use error::{Error, Result};
pub use invoker::{AgentInvoker, Invocation, Role, Toolset};
pub use session::{RunId, SessionKey};

// Re-exported so callers can build cancellation tokens without a direct dependency.
pub use tokio_util::sync::CancellationToken;
