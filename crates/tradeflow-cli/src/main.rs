//! Command-line interface for tradeflow

use anyhow::Context;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tradeflow_core::CancellationToken;
use tradeflow_runtime::{HttpInvoker, InvokerConfig};
use tradeflow_utils::{LogFormat, init_tracing_with};
use tradeflow_workflow::{DebateOutcome, Slot, WorkflowConfig, WorkflowCoordinator, WorkflowResult};

#[derive(Parser, Debug)]
#[command(name = "tradeflow")]
#[command(about = "Multi-agent BUY/HOLD/SELL decision pipeline", long_about = None)]
struct Args {
    /// Subject to analyze, usually a ticker symbol
    subject: String,

    /// Upper bound on bull/bear debate rounds
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Decision regenerations allowed after a flagged reflection
    #[arg(long)]
    max_retries: Option<u32>,

    /// Feed the risk synthesis into the decision
    #[arg(long)]
    include_risk: bool,

    /// Deadline of a single agent invocation, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Model name (overrides OPENAI_MODEL)
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// API base URL (overrides OPENAI_API_BASE)
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// Print the full result as JSON instead of a report
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn workflow_config(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = WorkflowConfig::default().with_env()?;
        if let Some(rounds) = self.max_rounds {
            config.max_rounds = rounds;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(secs) = self.timeout_secs {
            config.invoke_timeout = Duration::from_secs(secs);
        }
        if self.include_risk {
            config.include_risk_in_decision = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn invoker_config(&self) -> InvokerConfig {
        let mut config = InvokerConfig::from_env();
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(api_base) = &self.api_base {
            config = config.with_api_base(api_base.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing_with(format, "info");

    let invoker = HttpInvoker::with_config(args.invoker_config())
        .context("failed to set up the agent invoker")?;
    info!(
        model = %invoker.config().model,
        endpoint = %invoker.config().api_base,
        "Starting tradeflow"
    );

    let coordinator = WorkflowCoordinator::new(Arc::new(invoker), args.workflow_config()?)?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let result = coordinator
        .run_with_cancellation(&args.subject, token)
        .await
        .with_context(|| format!("workflow for {} failed", args.subject))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", summary_table(&result));
        println!();
        println!("{}", result.format_report());
    }

    Ok(())
}

fn slot_status(slot: &Slot) -> (&'static str, String) {
    match slot {
        Slot::Filled(text) => ("ok", first_line(text)),
        Slot::Failed { reason } => ("failed", reason.clone()),
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .chars()
        .take(80)
        .collect()
}

fn summary_table(result: &WorkflowResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Stage", "Status", "Detail"]);

    for (kind, slot) in result.reports.iter() {
        let (status, detail) = slot_status(slot);
        table.add_row(vec![format!("{kind} report"), status.to_string(), detail]);
    }

    let debate_status = match result.debate.outcome() {
        DebateOutcome::Concluded(verdict) => format!("verdict: {verdict}"),
        DebateOutcome::Exhausted => "no verdict".to_string(),
    };
    table.add_row(vec![
        "debate".to_string(),
        debate_status,
        format!("{} of {} rounds", result.debate.round, result.debate.max_rounds),
    ]);

    let (status, detail) = slot_status(&result.debate_synthesis);
    table.add_row(vec!["debate synthesis".to_string(), status.to_string(), detail]);

    let (status, detail) = slot_status(result.risk_synthesis());
    table.add_row(vec!["risk synthesis".to_string(), status.to_string(), detail]);

    table.add_row(vec![
        "decision".to_string(),
        result.decision.action.to_string(),
        format!(
            "retries: {}{}",
            result.retries_used,
            if result.budget_exhausted {
                " (still flagged)"
            } else {
                ""
            }
        ),
    ]);

    table
}
