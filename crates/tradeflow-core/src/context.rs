//! Per-run execution context
//!
//! A `RunContext` is created fresh for every workflow run and threaded
//! explicitly through each stage. It carries the run identity, the subject,
//! the per-invocation deadline and the run's cancellation token. Nothing in
//! it is shared with other runs.

use crate::invoker::{AgentInvoker, Invocation, Role, Toolset};
use crate::session::{RunId, SessionKey};
use crate::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default deadline applied to a single invocation
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(180);

/// Context passed to every stage of one run
///
/// # Example
///
/// ```
/// use tradeflow_core::{Role, RunContext};
/// use std::time::Duration;
///
/// let ctx = RunContext::new("NVDA").with_invoke_timeout(Duration::from_secs(30));
///
/// assert_eq!(ctx.subject(), "NVDA");
/// assert_eq!(ctx.session_key(Role::Trader).subject(), "NVDA");
/// ```
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    subject: String,
    invoke_timeout: Duration,
    cancellation: CancellationToken,
}

impl RunContext {
    /// Create a context for a new run on `subject`
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            subject: subject.into(),
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    // =========== Builder Methods ===========

    /// Set the deadline applied to each invocation
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Bind the run to an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    // =========== Accessors ===========

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Session key for `role` within this run
    pub fn session_key(&self, role: Role) -> SessionKey {
        SessionKey::new(role, self.subject.clone(), self.run_id)
    }

    /// Build an invocation whose deadline starts counting now
    pub fn invocation(
        &self,
        role: Role,
        instructions: impl Into<String>,
        toolset: Toolset,
        session: SessionKey,
        prompt: impl Into<String>,
    ) -> Invocation {
        Invocation {
            role,
            instructions: instructions.into(),
            toolset,
            session,
            prompt: prompt.into(),
            deadline: Instant::now() + self.invoke_timeout,
        }
    }

    /// Run an invocation under this run's deadline and cancellation
    ///
    /// This is the only suspension point of the pipeline. The call is
    /// abandoned as soon as the run is cancelled or the deadline passes.
    pub async fn invoke(&self, invoker: &dyn AgentInvoker, invocation: Invocation) -> Result<String> {
        let role = invocation.role;
        let deadline = invocation.deadline;
        debug!(%role, session = %invocation.session, "invoking agent");

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout_at(deadline, invoker.invoke(invocation)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    role,
                    after: self.invoke_timeout,
                }),
            },
        }
    }
}
