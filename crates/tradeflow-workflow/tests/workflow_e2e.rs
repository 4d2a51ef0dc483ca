//! End-to-end runs of the decision pipeline against a stub invoker

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tradeflow_core::{AgentInvoker, Invocation, Role, RunContext, SessionKey};
use tradeflow_runtime::{HttpInvoker, InvokerConfig};
use tradeflow_workflow::{
    Action, DebateOutcome, ProducerError, ReportKind, ReportProducer, Verdict, WorkflowConfig,
    WorkflowCoordinator,
};

/// Fixed answer per role; counts invocations
struct StubInvoker {
    judge: &'static str,
    reflection: &'static str,
    calls: Mutex<Vec<(Role, SessionKey)>>,
}

impl StubInvoker {
    fn new(judge: &'static str, reflection: &'static str) -> Self {
        Self {
            judge,
            reflection,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, role: Role) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }
}

#[async_trait]
impl AgentInvoker for StubInvoker {
    async fn invoke(&self, invocation: Invocation) -> tradeflow_core::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((invocation.role, invocation.session.clone()));

        let reply = match invocation.role {
            Role::BullResearcher => "Demand outlook is strong.",
            Role::BearResearcher => "Valuation is stretched.",
            Role::DebateJudge => self.judge,
            Role::ResearchManager => "Bulls made the better case.",
            Role::AggressiveDebator => "Go big.",
            Role::NeutralDebator => "Standard weight.",
            Role::ConservativeDebator => "Hedge it.",
            Role::RiskSynthesizer => "Moderate position with a stop.",
            Role::Trader => "Evidence supports upside. BUY",
            Role::Reflection => self.reflection,
            other => return Ok(format!("unexpected role {other}")),
        };
        Ok(reply.to_string())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Returns `OK:<kind>` without touching the invoker
struct FixedProducer(ReportKind);

#[async_trait]
impl ReportProducer for FixedProducer {
    async fn produce(&self, _ctx: &RunContext, _session: SessionKey) -> Result<String, ProducerError> {
        Ok(format!("OK:{}", self.0))
    }
}

fn coordinator(invoker: Arc<StubInvoker>, config: WorkflowConfig) -> WorkflowCoordinator {
    ReportKind::ALL
        .into_iter()
        .fold(
            WorkflowCoordinator::builder(invoker).config(config),
            |builder, kind| builder.producer(kind, Arc::new(FixedProducer(kind))),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_buy() {
    let invoker = Arc::new(StubInvoker::new("bull", "NO HALLUCINATION"));
    let coordinator = coordinator(invoker.clone(), WorkflowConfig::default());

    let result = coordinator.run("TEST").await.unwrap();

    assert_eq!(result.retries_used, 0);
    assert_eq!(result.decision.action, Action::Buy);
    assert!(!result.reflection.hallucination);
    assert!(!result.budget_exhausted);

    assert_eq!(result.reports.len(), 6);
    for kind in ReportKind::ALL {
        assert_eq!(result.reports.get(kind).text(), Some(format!("OK:{kind}").as_str()));
    }

    assert_eq!(result.debate.verdict, Verdict::Bull);
    assert_eq!(result.debate.round, 1);
    assert_eq!(result.debate.transcript.len(), 3);
    assert_eq!(result.risk_synthesis().text(), Some("Moderate position with a stop."));

    // custom producers replace the analyst agents
    assert_eq!(invoker.count(Role::NewsAnalyst), 0);
    assert_eq!(invoker.count(Role::Trader), 1);
}

#[tokio::test]
async fn test_best_effort_when_budgets_run_out() {
    let invoker = Arc::new(StubInvoker::new(
        "NO - neither side convinced me",
        "HALLUCINATION DETECTED: upside claim lacks a source",
    ));
    let config = WorkflowConfig::builder()
        .max_rounds(3)
        .max_retries(1)
        .build()
        .unwrap();
    let coordinator = coordinator(invoker.clone(), config);

    let result = coordinator.run("TEST").await.unwrap();

    assert_eq!(result.debate.outcome(), DebateOutcome::Exhausted);
    assert_eq!(result.debate.round, 3);
    assert_eq!(result.debate.transcript.len(), 9);

    assert!(result.budget_exhausted);
    assert!(result.reflection.hallucination);
    assert_eq!(result.retries_used, 1);
    assert_eq!(invoker.count(Role::Trader), 2);
    assert!(result.is_best_effort());
    assert_eq!(result.decision.action, Action::Buy);
}

#[test]
fn test_blocking_entry_point() {
    let invoker = Arc::new(StubInvoker::new("tie", "NO HALLUCINATION"));
    let coordinator = coordinator(invoker, WorkflowConfig::default());

    let result = tradeflow_workflow::run_workflow(&coordinator, "TEST").unwrap();

    assert_eq!(result.debate.verdict, Verdict::Tie);
    assert_eq!(result.decision.action, Action::Buy);
}

#[tokio::test]
async fn test_every_invocation_gets_its_own_session() {
    let invoker = Arc::new(StubInvoker::new("no", "HALLUCINATION DETECTED"));
    let coordinator = coordinator(invoker.clone(), WorkflowConfig::default());

    coordinator.run("TEST").await.unwrap();

    let calls = invoker.calls.lock().unwrap();
    let mut keys: Vec<String> = calls.iter().map(|(_, key)| key.to_string()).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);
}

/// Accepts connections and never answers
async fn silent_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{addr}/v1")
}

#[tokio::test]
async fn test_abandoned_run_releases_sessions() {
    let config = InvokerConfig::default().with_api_base(silent_endpoint().await);
    let invoker = Arc::new(HttpInvoker::with_config(config).unwrap());
    let coordinator = WorkflowCoordinator::new(invoker.clone(), WorkflowConfig::default()).unwrap();

    let mut run = Box::pin(coordinator.run("TEST"));
    tokio::select! {
        _ = &mut run => panic!("run finished against a silent endpoint"),
        () = tokio::time::sleep(Duration::from_millis(300)) => {}
    }
    assert_eq!(invoker.sessions().len(), ReportKind::ALL.len());

    drop(run);
    for _ in 0..100 {
        if invoker.sessions().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(invoker.sessions().is_empty());
}
