//! Report producers feeding the analyst fan-out

use crate::prompts::{Prompts, instructions, toolset};
use crate::reports::ReportKind;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tradeflow_core::{AgentInvoker, RunContext, SessionKey};

/// Why a producer returned no report
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The underlying agent invocation failed
    #[error(transparent)]
    Invoke(#[from] tradeflow_core::Error),

    /// The producer itself gave up
    #[error("producer failed: {0}")]
    Failed(String),
}

impl ProducerError {
    /// Whether the failure must end the run rather than just this report
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Invoke(tradeflow_core::Error::Cancelled | tradeflow_core::Error::SessionSetup { .. })
        )
    }
}

/// Produces one analyst report as opaque text
///
/// Implementations must bind every invocation to `session` and route it
/// through `ctx` so the run's deadline and cancellation apply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportProducer: Send + Sync {
    async fn produce(&self, ctx: &RunContext, session: SessionKey) -> Result<String, ProducerError>;
}

/// Default producer: an analyst agent driven through the invoker
pub struct AnalystProducer {
    invoker: Arc<dyn AgentInvoker>,
    prompts: Arc<Prompts>,
    kind: ReportKind,
}

impl AnalystProducer {
    pub fn new(invoker: Arc<dyn AgentInvoker>, prompts: Arc<Prompts>, kind: ReportKind) -> Self {
        Self {
            invoker,
            prompts,
            kind,
        }
    }
}

#[async_trait]
impl ReportProducer for AnalystProducer {
    async fn produce(&self, ctx: &RunContext, session: SessionKey) -> Result<String, ProducerError> {
        let role = self.kind.role();
        let prompt = self
            .prompts
            .analyst(self.kind, ctx.subject())
            .map_err(|e| ProducerError::Failed(e.to_string()))?;
        let invocation = ctx.invocation(role, instructions(role), toolset(role), session, prompt);

        Ok(ctx.invoke(self.invoker.as_ref(), invocation).await?)
    }
}
