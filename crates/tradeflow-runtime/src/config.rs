//! Configuration for the HTTP invoker

use crate::error::{Result, RuntimeError};
use std::time::Duration;
use tradeflow_utils::env_parse;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for [`HttpInvoker`](crate::HttpInvoker)
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Base URL of the OpenAI-compatible API
    /// (e.g. "http://localhost:1234/v1" for LM Studio)
    pub api_base: String,

    /// Bearer token; local servers usually accept anything
    pub api_key: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Upper bound on requests issued per minute, shared by all runs
    pub requests_per_minute: u32,

    /// TCP connect timeout; the overall request deadline comes from each invocation
    pub connect_timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: "not-needed".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            requests_per_minute: 60,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl InvokerConfig {
    /// Load configuration from the environment
    ///
    /// Reads `OPENAI_API_BASE`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
    /// `OPENAI_MAX_TOKENS`, `OPENAI_TEMPERATURE` and
    /// `TRADEFLOW_REQUESTS_PER_MINUTE`; anything unset keeps its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_parse("OPENAI_API_BASE").unwrap_or(defaults.api_base),
            api_key: env_parse("OPENAI_API_KEY").unwrap_or(defaults.api_key),
            model: env_parse("OPENAI_MODEL").unwrap_or(defaults.model),
            max_tokens: env_parse("OPENAI_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: env_parse("OPENAI_TEMPERATURE").unwrap_or(defaults.temperature),
            requests_per_minute: env_parse("TRADEFLOW_REQUESTS_PER_MINUTE")
                .unwrap_or(defaults.requests_per_minute),
            connect_timeout: defaults.connect_timeout,
        }
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the request rate limit
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Chat completions endpoint URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(RuntimeError::ConfigError(
                "api_base must not be empty".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(RuntimeError::ConfigError(
                "model must not be empty".to_string(),
            ));
        }

        if self.requests_per_minute == 0 {
            return Err(RuntimeError::ConfigError(
                "requests_per_minute must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InvokerConfig::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.requests_per_minute, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let config = InvokerConfig::default().with_api_base("http://localhost:1234/v1/");
        assert_eq!(
            config.completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_validation() {
        assert!(
            InvokerConfig::default()
                .with_model("  ")
                .validate()
                .is_err()
        );
        assert!(
            InvokerConfig::default()
                .with_requests_per_minute(0)
                .validate()
                .is_err()
        );
    }
}
