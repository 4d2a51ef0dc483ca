//! Trading decision with reflection-checked retries

use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::prompts::{DecisionContext, Prompts, instructions, toolset};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};
use tradeflow_core::{AgentInvoker, Role, RunContext};

/// Final trade action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        })
    }
}

/// A trader's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Full answer, trimmed
    pub rationale: String,
    pub action: Action,
}

impl Decision {
    /// Parse a trader's answer; the action is the trailing token
    pub fn parse(text: &str) -> Result<Self> {
        let rationale = text.trim();
        let action = parse_action(rationale).ok_or_else(|| WorkflowError::UnparseableDecision {
            excerpt: excerpt(rationale),
        })?;

        Ok(Self {
            rationale: rationale.to_string(),
            action,
        })
    }
}

/// Parse BUY/HOLD/SELL from the last token, ignoring punctuation and markdown emphasis
pub fn parse_action(text: &str) -> Option<Action> {
    let token = text.split_whitespace().last()?;
    let token = token
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_uppercase();

    match token.as_str() {
        "BUY" => Some(Action::Buy),
        "HOLD" => Some(Action::Hold),
        "SELL" => Some(Action::Sell),
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    let start = text
        .char_indices()
        .rev()
        .nth(79)
        .map_or(0, |(idx, _)| idx);
    text[start..].to_string()
}

/// Reviewer's judgement of a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    /// The decision makes claims the research does not support
    pub hallucination: bool,
    pub explanation: String,
}

impl ReflectionVerdict {
    pub fn parse(text: &str) -> Self {
        Self {
            hallucination: parse_reflection(text),
            explanation: text.trim().to_string(),
        }
    }
}

/// Whether the reviewer flagged the decision
///
/// "NO HALLUCINATION" at the start clears it; any other mention of
/// "HALLUCINATION" flags it.
pub fn parse_reflection(text: &str) -> bool {
    let upper = text.trim_start().to_uppercase();
    !upper.starts_with("NO HALLUCINATION") && upper.contains("HALLUCINATION")
}

/// What the retry loop settled on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub reflection: ReflectionVerdict,
    /// Regenerations after the first attempt
    pub retries_used: u32,
    /// Still flagged after the last allowed attempt
    pub budget_exhausted: bool,
}

/// Generates a decision and regenerates it while the reviewer flags it
pub struct DecisionRetryLoop<'a> {
    invoker: &'a dyn AgentInvoker,
    prompts: &'a Prompts,
    config: &'a WorkflowConfig,
}

impl<'a> DecisionRetryLoop<'a> {
    pub fn new(invoker: &'a dyn AgentInvoker, prompts: &'a Prompts, config: &'a WorkflowConfig) -> Self {
        Self {
            invoker,
            prompts,
            config,
        }
    }

    #[instrument(skip(self, ctx, context), fields(subject = %ctx.subject(), max_retries = self.config.max_retries))]
    pub async fn run(&self, ctx: &RunContext, context: &DecisionContext) -> Result<DecisionOutcome> {
        let mut attempt = 0;
        let mut feedback: Option<String> = None;

        loop {
            let decision = self.decide(ctx, context, feedback.as_deref(), attempt).await?;
            let reflection = self.reflect(ctx, context, &decision, attempt).await?;

            if !reflection.hallucination {
                info!(attempt, action = %decision.action, "decision accepted");
                return Ok(DecisionOutcome {
                    decision,
                    reflection,
                    retries_used: attempt,
                    budget_exhausted: false,
                });
            }

            if attempt >= self.config.max_retries {
                warn!(
                    attempt,
                    action = %decision.action,
                    "retry budget exhausted, keeping last decision"
                );
                return Ok(DecisionOutcome {
                    decision,
                    reflection,
                    retries_used: attempt,
                    budget_exhausted: true,
                });
            }

            warn!(attempt, "reflection flagged the decision, regenerating");
            let backoff = self.config.retry_backoff(attempt);
            if !backoff.is_zero() {
                tokio::select! {
                    biased;
                    () = ctx.cancellation().cancelled() => return Err(WorkflowError::Cancelled),
                    () = tokio::time::sleep(backoff) => {}
                }
            }
            feedback = Some(reflection.explanation);
            attempt += 1;
        }
    }

    async fn decide(
        &self,
        ctx: &RunContext,
        context: &DecisionContext,
        feedback: Option<&str>,
        attempt: u32,
    ) -> Result<Decision> {
        let prompt = self.prompts.trader(ctx.subject(), context, feedback)?;
        let invocation = ctx.invocation(
            Role::Trader,
            instructions(Role::Trader),
            toolset(Role::Trader),
            ctx.session_key(Role::Trader).at(attempt),
            prompt,
        );
        let text = ctx
            .invoke(self.invoker, invocation)
            .await
            .map_err(|e| WorkflowError::in_stage(e, "decision"))?;

        Decision::parse(&text)
    }

    async fn reflect(
        &self,
        ctx: &RunContext,
        context: &DecisionContext,
        decision: &Decision,
        attempt: u32,
    ) -> Result<ReflectionVerdict> {
        let prompt = self
            .prompts
            .reflection(ctx.subject(), context, &decision.rationale)?;
        let invocation = ctx.invocation(
            Role::Reflection,
            instructions(Role::Reflection),
            toolset(Role::Reflection),
            ctx.session_key(Role::Reflection).at(attempt),
            prompt,
        );
        let text = ctx
            .invoke(self.invoker, invocation)
            .await
            .map_err(|e| WorkflowError::in_stage(e, "reflection"))?;

        Ok(ReflectionVerdict::parse(&text))
    }
}
