//! End-to-end decision pipeline
//!
//! fan-out ──► ( debate + synthesis  ‖  risk chain ) ──► decision loop
//!
//! The debate and the risk chain only read the report bundle, so they run
//! concurrently. Every run gets a fresh [`RunContext`]; nothing mutable is
//! shared between runs.

use crate::config::WorkflowConfig;
use crate::debate::{DEBATE_CONTEXT, DebateEngine, DebateOutcome, DebateState};
use crate::decision::{Decision, DecisionRetryLoop, ReflectionVerdict};
use crate::error::{Result, WorkflowError};
use crate::fanout::FanOutCoordinator;
use crate::producer::ReportProducer;
use crate::prompts::{DecisionContext, Prompts};
use crate::reports::{AnalystReportBundle, ReportKind};
use crate::risk::{RISK_CONTEXT, RiskDebateState, RiskStanceSynthesizer};
use crate::slot::Slot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use tradeflow_core::{AgentInvoker, CancellationToken, RunContext, RunId};

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub run_id: RunId,
    pub subject: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: AnalystReportBundle,
    pub debate: DebateState,
    pub debate_synthesis: Slot,
    pub risk: RiskDebateState,
    pub decision: Decision,
    pub reflection: ReflectionVerdict,
    pub retries_used: u32,
    /// The last decision was still flagged when the retry budget ran out
    pub budget_exhausted: bool,
}

impl WorkflowResult {
    pub fn risk_synthesis(&self) -> &Slot {
        &self.risk.synthesis
    }

    /// Whether the result is a best-effort answer
    pub fn is_best_effort(&self) -> bool {
        self.budget_exhausted || self.debate.outcome() == DebateOutcome::Exhausted
    }

    /// Format the run as a plain-text report
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("# Trading Decision: {}\n\n", self.subject));
        report.push_str(&format!(
            "**Action**: {}  (retries: {}{})\n\n",
            self.decision.action,
            self.retries_used,
            if self.budget_exhausted {
                ", still flagged by reflection"
            } else {
                ""
            }
        ));

        report.push_str("## Rationale\n\n");
        report.push_str(&self.decision.rationale);
        report.push_str("\n\n");

        report.push_str("## Reflection\n\n");
        report.push_str(&self.reflection.explanation);
        report.push_str("\n\n");

        let debate_label = match self.debate.outcome() {
            DebateOutcome::Concluded(verdict) => {
                format!("verdict {verdict} after {} round(s)", self.debate.round)
            }
            DebateOutcome::Exhausted => {
                format!("no verdict after {} round(s)", self.debate.round)
            }
        };
        report.push_str(&format!("## Research Debate ({debate_label})\n\n"));
        report.push_str(&self.debate_synthesis.render());
        report.push_str("\n\n");

        report.push_str("## Risk Synthesis\n\n");
        report.push_str(&self.risk.synthesis.render());
        report.push_str("\n\n");

        report.push_str("## Analyst Reports\n\n");
        for (kind, slot) in self.reports.iter() {
            report.push_str(&format!("### {kind}\n\n"));
            report.push_str(&slot.render());
            report.push_str("\n\n");
        }

        report
    }
}

/// Sequences the pipeline stages for one subject at a time
pub struct WorkflowCoordinator {
    invoker: Arc<dyn AgentInvoker>,
    prompts: Arc<Prompts>,
    fanout: FanOutCoordinator,
    config: WorkflowConfig,
}

impl WorkflowCoordinator {
    /// Create a coordinator builder
    pub fn builder(invoker: Arc<dyn AgentInvoker>) -> WorkflowCoordinatorBuilder {
        WorkflowCoordinatorBuilder {
            invoker,
            config: None,
            producers: Vec::new(),
        }
    }

    /// Coordinator with default analyst producers
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: WorkflowConfig) -> Result<Self> {
        Self::builder(invoker).config(config).build()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run the full pipeline for `subject`
    pub async fn run(&self, subject: &str) -> Result<WorkflowResult> {
        self.run_with_cancellation(subject, CancellationToken::new())
            .await
    }

    /// Run the pipeline, abandoning in-flight invocations once `token` fires
    #[instrument(skip(self, token), fields(invoker = self.invoker.name()))]
    pub async fn run_with_cancellation(
        &self,
        subject: &str,
        token: CancellationToken,
    ) -> Result<WorkflowResult> {
        let ctx = RunContext::new(subject)
            .with_invoke_timeout(self.config.invoke_timeout)
            .with_cancellation(token);
        let started_at = Utc::now();
        info!(run_id = %ctx.run_id(), "workflow started");

        let mut guard = RunGuard::new(self.invoker.clone(), ctx.run_id());
        let outcome = self.execute(&ctx, started_at).await;
        guard.close().await;

        match &outcome {
            Ok(result) => info!(
                run_id = %ctx.run_id(),
                action = %result.decision.action,
                retries = result.retries_used,
                best_effort = result.is_best_effort(),
                "workflow finished"
            ),
            Err(err) => error!(run_id = %ctx.run_id(), error = %err, "workflow failed"),
        }
        outcome
    }

    /// Blocking entry point; builds its own runtime
    ///
    /// Must not be called from inside an async context.
    pub fn run_blocking(&self, subject: &str) -> Result<WorkflowResult> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(subject))
    }

    async fn execute(&self, ctx: &RunContext, started_at: DateTime<Utc>) -> Result<WorkflowResult> {
        let reports = self.fanout.run(ctx).await?;

        let debate_engine = DebateEngine::new(self.invoker.as_ref(), &self.prompts);
        let risk_chain = RiskStanceSynthesizer::new(self.invoker.as_ref(), &self.prompts);

        let debate_branch = async {
            let state = debate_engine
                .run(ctx, reports.select(&DEBATE_CONTEXT), self.config.max_rounds)
                .await?;
            let synthesis = debate_engine.synthesize(ctx, &state).await?;
            Ok::<_, WorkflowError>((state, synthesis))
        };
        let risk_branch = risk_chain.run(ctx, reports.select(&RISK_CONTEXT));

        let ((debate, debate_synthesis), risk) = tokio::try_join!(debate_branch, risk_branch)?;

        let context = DecisionContext {
            synthesis: debate_synthesis.clone(),
            reports: reports.select(&ReportKind::ALL),
            risk: self
                .config
                .include_risk_in_decision
                .then(|| risk.synthesis.clone()),
        };
        let outcome = DecisionRetryLoop::new(self.invoker.as_ref(), &self.prompts, &self.config)
            .run(ctx, &context)
            .await?;

        Ok(WorkflowResult {
            run_id: ctx.run_id(),
            subject: ctx.subject().to_string(),
            started_at,
            finished_at: Utc::now(),
            reports,
            debate,
            debate_synthesis,
            risk,
            decision: outcome.decision,
            reflection: outcome.reflection,
            retries_used: outcome.retries_used,
            budget_exhausted: outcome.budget_exhausted,
        })
    }
}

/// Closes the run's sessions even when the run future is dropped midway
struct RunGuard {
    invoker: Option<Arc<dyn AgentInvoker>>,
    run_id: RunId,
}

impl RunGuard {
    fn new(invoker: Arc<dyn AgentInvoker>, run_id: RunId) -> Self {
        Self {
            invoker: Some(invoker),
            run_id,
        }
    }

    async fn close(&mut self) {
        if let Some(invoker) = self.invoker.take() {
            invoker.close_run(self.run_id).await;
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(invoker) = self.invoker.take() else {
            return;
        };
        let run_id = self.run_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%run_id, "run abandoned, closing its sessions");
                handle.spawn(async move { invoker.close_run(run_id).await });
            }
            Err(_) => warn!(%run_id, "run abandoned outside a runtime, sessions left open"),
        }
    }
}

/// Builder for WorkflowCoordinator
pub struct WorkflowCoordinatorBuilder {
    invoker: Arc<dyn AgentInvoker>,
    config: Option<WorkflowConfig>,
    producers: Vec<(ReportKind, Arc<dyn ReportProducer>)>,
}

impl WorkflowCoordinatorBuilder {
    /// Set the run configuration
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom producer for one report kind instead of the analyst agent
    pub fn producer(mut self, kind: ReportKind, producer: Arc<dyn ReportProducer>) -> Self {
        self.producers.push((kind, producer));
        self
    }

    /// Build the coordinator
    pub fn build(self) -> Result<WorkflowCoordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let prompts = Arc::new(Prompts::new()?);
        let mut fanout =
            FanOutCoordinator::with_invoker(self.invoker.clone(), prompts.clone(), config.fanout_timeout);
        for (kind, producer) in self.producers {
            fanout.set_producer(kind, producer);
        }

        Ok(WorkflowCoordinator {
            invoker: self.invoker,
            prompts,
            fanout,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::Verdict;
    use crate::decision::Action;
    use crate::producer::MockReportProducer;
    use crate::test_support::ScriptedInvoker;
    use tokio_test::assert_err;
    use tradeflow_core::{Error, Role};

    fn scripted() -> ScriptedInvoker {
        ScriptedInvoker::new()
            .reply(Role::DebateJudge, "Bull")
            .reply(Role::ResearchManager, "SYNTHESIS: bulls carried it")
            .reply(Role::RiskSynthesizer, "RISK: half position")
            .reply(Role::Trader, "Debate and reports favor upside. BUY")
            .reply(Role::Reflection, "NO HALLUCINATION")
    }

    #[tokio::test]
    async fn test_pipeline_order_and_context() {
        let invoker = Arc::new(scripted());
        let coordinator = WorkflowCoordinator::new(invoker.clone(), WorkflowConfig::default()).unwrap();

        let result = coordinator.run("NVDA").await.unwrap();

        assert_eq!(result.decision.action, Action::Buy);
        assert_eq!(result.debate.verdict, Verdict::Bull);
        assert_eq!(result.debate_synthesis.text(), Some("SYNTHESIS: bulls carried it"));
        assert_eq!(result.risk_synthesis().text(), Some("RISK: half position"));
        assert!(!result.is_best_effort());
        assert!(result.finished_at >= result.started_at);

        let trader_prompt = &invoker.prompts(Role::Trader)[0];
        assert!(trader_prompt.contains("SYNTHESIS: bulls carried it"));
        assert!(trader_prompt.contains("bullish_analyst reply"));
        assert!(trader_prompt.contains("fundamentals_analyst reply"));
        assert!(!trader_prompt.contains("RISK: half position"));

        assert_eq!(invoker.closed_runs(), vec![result.run_id]);
    }

    #[tokio::test]
    async fn test_risk_toggle_feeds_decision() {
        let invoker = Arc::new(scripted());
        let config = WorkflowConfig::builder()
            .include_risk_in_decision(true)
            .build()
            .unwrap();
        let coordinator = WorkflowCoordinator::new(invoker.clone(), config).unwrap();

        coordinator.run("NVDA").await.unwrap();

        assert!(invoker.prompts(Role::Trader)[0].contains("RISK: half position"));
        assert!(invoker.prompts(Role::Reflection)[0].contains("RISK: half position"));
    }

    #[tokio::test]
    async fn test_custom_producer_overrides_analyst() {
        let invoker = Arc::new(scripted());
        let mut news = MockReportProducer::new();
        news.expect_produce()
            .times(1)
            .returning(|_, _| Ok("NEWS FROM FEED".to_string()));

        let coordinator = WorkflowCoordinator::builder(invoker.clone())
            .producer(ReportKind::News, Arc::new(news))
            .build()
            .unwrap();

        let result = coordinator.run("NVDA").await.unwrap();

        assert_eq!(result.reports.get(ReportKind::News).text(), Some("NEWS FROM FEED"));
        assert!(invoker.calls(Role::NewsAnalyst).is_empty());
    }

    #[tokio::test]
    async fn test_debate_timeout_fails_run_and_closes_sessions() {
        let invoker = Arc::new(scripted().script(
            Role::BearResearcher,
            [Err(Error::Timeout {
                role: Role::BearResearcher,
                after: std::time::Duration::from_secs(1),
            })],
        ));
        let coordinator = WorkflowCoordinator::new(invoker.clone(), WorkflowConfig::default()).unwrap();

        let err = assert_err!(coordinator.run("NVDA").await);
        assert!(matches!(err, WorkflowError::Timeout { .. }));
        assert_eq!(invoker.closed_runs().len(), 1);
        assert!(invoker.calls(Role::Trader).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let invoker = Arc::new(scripted());
        let coordinator = WorkflowCoordinator::new(invoker.clone(), WorkflowConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = assert_err!(coordinator.run_with_cancellation("NVDA", token).await);
        assert!(matches!(err, WorkflowError::Cancelled));
        assert_eq!(invoker.closed_runs().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let invoker = Arc::new(scripted());
        let coordinator = WorkflowCoordinator::new(invoker.clone(), WorkflowConfig::default()).unwrap();

        let (a, b) = tokio::join!(coordinator.run("AAPL"), coordinator.run("MSFT"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.subject, "AAPL");
        assert_eq!(b.subject, "MSFT");
        assert!(
            invoker
                .calls(Role::Trader)
                .iter()
                .all(|call| call
                    .prompt
                    .contains(&format!("trade for {}", call.session.subject())))
        );
    }

    #[test]
    fn test_format_report_and_json() {
        let invoker = Arc::new(scripted());
        let coordinator = WorkflowCoordinator::new(invoker, WorkflowConfig::default()).unwrap();

        let result = coordinator.run_blocking("NVDA").unwrap();
        let report = result.format_report();

        assert!(report.starts_with("# Trading Decision: NVDA"));
        assert!(report.contains("**Action**: BUY"));
        assert!(report.contains("verdict bull after 1 round(s)"));
        assert!(report.contains("### fundamentals"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["decision"]["action"], "BUY");
        assert_eq!(json["retries_used"], 0);
        assert_eq!(json["reports"]["reports"]["news"]["filled"], "news_analyst reply");
    }
}
