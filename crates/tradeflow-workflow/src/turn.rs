//! Single agent turns inside a sequential stage

use crate::error::Result;
use crate::prompts::{instructions, toolset};
use crate::slot::Slot;
use tracing::warn;
use tradeflow_core::{AgentInvoker, Role, RunContext, SessionKey};

/// Run one turn as `role`, absorbing plain transport failures into the slot
///
/// Timeouts, cancellation and session setup failures still end the run.
pub(crate) async fn invoke_turn(
    ctx: &RunContext,
    invoker: &dyn AgentInvoker,
    role: Role,
    session: SessionKey,
    prompt: String,
) -> Result<Slot> {
    let invocation = ctx.invocation(role, instructions(role), toolset(role), session, prompt);

    match ctx.invoke(invoker, invocation).await {
        Ok(text) => Ok(Slot::Filled(text)),
        Err(err) if !err.is_fatal() => {
            warn!(%role, error = %err, "turn failed, continuing with placeholder");
            Ok(Slot::failed(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}
