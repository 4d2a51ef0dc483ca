//! Configuration for workflow runs

use crate::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradeflow_core::DEFAULT_INVOKE_TIMEOUT;
use tradeflow_utils::{env_flag, env_parse};

/// Tunables of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on bull/bear/judge rounds
    pub max_rounds: u32,

    /// Extra decision attempts after the first one is flagged
    pub max_retries: u32,

    /// Pause before the first regeneration; doubles with every further attempt
    pub retry_backoff_base: Duration,

    /// Deadline of a single agent invocation
    pub invoke_timeout: Duration,

    /// Join deadline of the analyst fan-out
    pub fanout_timeout: Duration,

    /// Feed the risk synthesis into the decision prompt
    pub include_risk_in_decision: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            max_retries: 2,
            retry_backoff_base: Duration::ZERO,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            fanout_timeout: Duration::from_secs(600), // 10 minutes
            include_risk_in_decision: false,
        }
    }
}

impl WorkflowConfig {
    /// Create a new configuration builder
    pub fn builder() -> WorkflowConfigBuilder {
        WorkflowConfigBuilder::default()
    }

    /// Override fields from `TRADEFLOW_*` environment variables
    ///
    /// Reads `TRADEFLOW_MAX_ROUNDS`, `TRADEFLOW_MAX_RETRIES`,
    /// `TRADEFLOW_INVOKE_TIMEOUT_SECS` and `TRADEFLOW_INCLUDE_RISK`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(rounds) = env_parse("TRADEFLOW_MAX_ROUNDS") {
            self.max_rounds = rounds;
        }
        if let Some(retries) = env_parse("TRADEFLOW_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(secs) = env_parse("TRADEFLOW_INVOKE_TIMEOUT_SECS") {
            self.invoke_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = env_flag("TRADEFLOW_INCLUDE_RISK") {
            self.include_risk_in_decision = flag;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(WorkflowError::Config(
                "max_rounds must be greater than 0".to_string(),
            ));
        }

        if self.invoke_timeout.is_zero() {
            return Err(WorkflowError::Config(
                "invoke_timeout must be greater than 0".to_string(),
            ));
        }

        if self.fanout_timeout < self.invoke_timeout {
            return Err(WorkflowError::Config(
                "fanout_timeout must not be shorter than invoke_timeout".to_string(),
            ));
        }

        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base * 2_u32.saturating_pow(attempt)
    }
}

/// Builder for WorkflowConfig
#[derive(Debug, Default)]
pub struct WorkflowConfigBuilder {
    max_rounds: Option<u32>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    invoke_timeout: Option<Duration>,
    fanout_timeout: Option<Duration>,
    include_risk_in_decision: Option<bool>,
}

impl WorkflowConfigBuilder {
    /// Set the debate round cap
    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Set the decision retry budget
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    /// Set per-invocation timeout
    pub fn invoke_timeout(mut self, duration: Duration) -> Self {
        self.invoke_timeout = Some(duration);
        self
    }

    /// Set the fan-out join deadline
    pub fn fanout_timeout(mut self, duration: Duration) -> Self {
        self.fanout_timeout = Some(duration);
        self
    }

    /// Include the risk synthesis in the decision context
    pub fn include_risk_in_decision(mut self, include: bool) -> Self {
        self.include_risk_in_decision = Some(include);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<WorkflowConfig> {
        let defaults = WorkflowConfig::default();

        let config = WorkflowConfig {
            max_rounds: self.max_rounds.unwrap_or(defaults.max_rounds),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            invoke_timeout: self.invoke_timeout.unwrap_or(defaults.invoke_timeout),
            fanout_timeout: self.fanout_timeout.unwrap_or(defaults.fanout_timeout),
            include_risk_in_decision: self
                .include_risk_in_decision
                .unwrap_or(defaults.include_risk_in_decision),
        };

        config.validate()?;
        Ok(config)
    }
}
