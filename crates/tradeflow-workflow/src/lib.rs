//! Decision pipeline for tradeflow
//!
//! Turns a single subject (usually a ticker) into a BUY/HOLD/SELL decision:
//!
//! 1. six analyst reports are gathered concurrently ([`FanOutCoordinator`]);
//! 2. a bull and a bear researcher debate in front of a judge
//!    ([`DebateEngine`]) while three risk analysts take turns
//!    ([`RiskStanceSynthesizer`]);
//! 3. a trader decides and a reviewer checks the rationale, retrying within a
//!    budget ([`DecisionRetryLoop`]).
//!
//! [`WorkflowCoordinator`] wires the stages together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tradeflow_runtime::HttpInvoker;
//! use tradeflow_workflow::{WorkflowConfig, WorkflowCoordinator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let invoker = Arc::new(HttpInvoker::from_env()?);
//! let coordinator = WorkflowCoordinator::new(invoker, WorkflowConfig::default().with_env()?)?;
//!
//! let result = coordinator.run("NVDA").await?;
//! println!("{}", result.format_report());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debate;
pub mod decision;
pub mod error;
pub mod fanout;
pub mod producer;
pub mod prompts;
pub mod reports;
pub mod risk;
pub mod slot;
pub mod workflow;

mod turn;

#[cfg(test)]
mod test_support;

pub use config::{WorkflowConfig, WorkflowConfigBuilder};
pub use debate::{
    DebateEngine, DebateOutcome, DebateState, Speaker, TranscriptEntry, Turn, Verdict, next_turn,
    parse_verdict,
};
pub use decision::{
    Action, Decision, DecisionOutcome, DecisionRetryLoop, ReflectionVerdict, parse_action,
    parse_reflection,
};
pub use error::{Result, WorkflowError};
pub use fanout::FanOutCoordinator;
pub use producer::{AnalystProducer, ProducerError, ReportProducer};
pub use prompts::{DecisionContext, Prompts};
pub use reports::{AnalystReportBundle, ReportKind};
pub use risk::{RiskDebateState, RiskStanceSynthesizer};
pub use slot::Slot;
pub use workflow::{WorkflowCoordinator, WorkflowCoordinatorBuilder, WorkflowResult};

/// Run the whole pipeline for `subject`, blocking the calling thread
pub fn run_workflow(coordinator: &WorkflowCoordinator, subject: &str) -> Result<WorkflowResult> {
    coordinator.run_blocking(subject)
}
