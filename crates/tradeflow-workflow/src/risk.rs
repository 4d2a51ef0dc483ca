//! Sequential risk stances and their synthesis

use crate::error::Result;
use crate::prompts::Prompts;
use crate::reports::ReportKind;
use crate::slot::Slot;
use crate::turn::invoke_turn;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use tradeflow_core::{AgentInvoker, Role, RunContext};

/// Report kinds the risk analysts work from
pub const RISK_CONTEXT: [ReportKind; 3] = [
    ReportKind::Sentiment,
    ReportKind::News,
    ReportKind::Fundamentals,
];

/// Output of the risk chain, filled strictly in field order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDebateState {
    pub subject: String,
    pub aggressive: Slot,
    pub neutral: Slot,
    pub conservative: Slot,
    pub synthesis: Slot,
}

/// Aggressive, then neutral, then conservative, then synthesis
///
/// Each stance sees every stance produced before it. The synthesis sees the
/// three stances and nothing else.
pub struct RiskStanceSynthesizer<'a> {
    invoker: &'a dyn AgentInvoker,
    prompts: &'a Prompts,
}

impl<'a> RiskStanceSynthesizer<'a> {
    pub fn new(invoker: &'a dyn AgentInvoker, prompts: &'a Prompts) -> Self {
        Self { invoker, prompts }
    }

    #[instrument(skip(self, ctx, reports), fields(subject = %ctx.subject()))]
    pub async fn run(&self, ctx: &RunContext, reports: Vec<(ReportKind, Slot)>) -> Result<RiskDebateState> {
        let aggressive = self
            .stance(ctx, Role::AggressiveDebator, "aggressive", &reports, &[], 0)
            .await?;

        let neutral = self
            .stance(
                ctx,
                Role::NeutralDebator,
                "neutral",
                &reports,
                &[("aggressive", &aggressive)],
                1,
            )
            .await?;

        let conservative = self
            .stance(
                ctx,
                Role::ConservativeDebator,
                "conservative",
                &reports,
                &[("aggressive", &aggressive), ("neutral", &neutral)],
                2,
            )
            .await?;

        let prompt = self.prompts.risk_synthesis(
            ctx.subject(),
            &[
                ("aggressive", &aggressive),
                ("neutral", &neutral),
                ("conservative", &conservative),
            ],
        )?;
        let synthesis = invoke_turn(
            ctx,
            self.invoker,
            Role::RiskSynthesizer,
            ctx.session_key(Role::RiskSynthesizer).at(3),
            prompt,
        )
        .await?;

        info!(
            failed = [&aggressive, &neutral, &conservative, &synthesis]
                .iter()
                .filter(|slot| !slot.is_filled())
                .count(),
            "risk chain finished"
        );

        Ok(RiskDebateState {
            subject: ctx.subject().to_string(),
            aggressive,
            neutral,
            conservative,
            synthesis,
        })
    }

    async fn stance(
        &self,
        ctx: &RunContext,
        role: Role,
        stance: &str,
        reports: &[(ReportKind, Slot)],
        prior: &[(&str, &Slot)],
        position: u32,
    ) -> Result<Slot> {
        let prompt = self.prompts.risk_stance(stance, ctx.subject(), reports, prior)?;
        invoke_turn(ctx, self.invoker, role, ctx.session_key(role).at(position), prompt).await
    }
}
