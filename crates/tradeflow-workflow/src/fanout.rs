//! Concurrent analyst fan-out
//!
//! One task per report kind, joined at a single barrier. A misbehaving
//! producer only costs its own slot.

use crate::error::{Result, WorkflowError};
use crate::producer::{AnalystProducer, ProducerError, ReportProducer};
use crate::prompts::Prompts;
use crate::reports::{AnalystReportBundle, ReportKind};
use crate::slot::Slot;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use tradeflow_core::{AgentInvoker, RunContext};

/// Runs the six report producers concurrently
pub struct FanOutCoordinator {
    producers: BTreeMap<ReportKind, Arc<dyn ReportProducer>>,
    join_timeout: Duration,
}

impl FanOutCoordinator {
    /// Build from explicit producers; every [`ReportKind`] needs one
    pub fn new(
        producers: impl IntoIterator<Item = (ReportKind, Arc<dyn ReportProducer>)>,
        join_timeout: Duration,
    ) -> Result<Self> {
        let producers: BTreeMap<_, _> = producers.into_iter().collect();

        let missing: Vec<&str> = ReportKind::ALL
            .iter()
            .filter(|kind| !producers.contains_key(*kind))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::Config(format!(
                "no report producer for: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            producers,
            join_timeout,
        })
    }

    /// Analyst agents for every kind, all driven through `invoker`
    pub fn with_invoker(invoker: Arc<dyn AgentInvoker>, prompts: Arc<Prompts>, join_timeout: Duration) -> Self {
        let producers = ReportKind::ALL
            .into_iter()
            .map(|kind| {
                let producer: Arc<dyn ReportProducer> =
                    Arc::new(AnalystProducer::new(invoker.clone(), prompts.clone(), kind));
                (kind, producer)
            })
            .collect();

        Self {
            producers,
            join_timeout,
        }
    }

    /// Replace the producer for one kind
    pub fn set_producer(&mut self, kind: ReportKind, producer: Arc<dyn ReportProducer>) {
        self.producers.insert(kind, producer);
    }

    /// Gather all reports for the run's subject
    ///
    /// Returns once every task has finished or the join deadline passes.
    /// Only cancellation and session setup failures abort the whole fan-out.
    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn run(&self, ctx: &RunContext) -> Result<AnalystReportBundle> {
        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<ReportKind> = BTreeSet::new();

        for (kind, producer) in &self.producers {
            let kind = *kind;
            let producer = Arc::clone(producer);
            let task_ctx = ctx.clone();
            let session = ctx.session_key(kind.role());

            tasks.spawn(async move { (kind, producer.produce(&task_ctx, session).await) });
            pending.insert(kind);
        }

        let deadline = Instant::now() + self.join_timeout;
        let mut slots: Vec<(ReportKind, Slot)> = Vec::with_capacity(pending.len());
        let mut timed_out = false;

        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => {
                    tasks.abort_all();
                    return Err(WorkflowError::Cancelled);
                }
                next = tokio::time::timeout_at(deadline, tasks.join_next()) => next,
            };

            match next {
                Err(_) => {
                    warn!(pending = tasks.len(), "fan-out join deadline passed");
                    tasks.abort_all();
                    timed_out = true;
                    break;
                }
                Ok(None) => break,
                Ok(Some(Ok((kind, outcome)))) => {
                    pending.remove(&kind);
                    match outcome {
                        Ok(text) => slots.push((kind, Slot::Filled(text))),
                        Err(err) if err.is_fatal() => {
                            tasks.abort_all();
                            return Err(match err {
                                ProducerError::Invoke(e) => e.into(),
                                ProducerError::Failed(reason) => WorkflowError::Transport {
                                    stage: "fan-out",
                                    reason,
                                },
                            });
                        }
                        Err(err) => {
                            warn!(%kind, error = %err, "report producer failed");
                            slots.push((kind, Slot::failed(err.to_string())));
                        }
                    }
                }
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "report producer task did not complete");
                }
            }
        }

        let reason = if timed_out {
            format!("no report within {:?}", self.join_timeout)
        } else {
            "producer task panicked".to_string()
        };
        slots.extend(pending.into_iter().map(|kind| (kind, Slot::failed(reason.clone()))));

        let bundle = AnalystReportBundle::from_slots(slots);
        info!(
            filled = bundle.filled_count(),
            total = bundle.len(),
            "analyst fan-out complete"
        );
        Ok(bundle)
    }
}
