//! OpenAI-compatible chat completions invoker
//!
//! See: https://platform.openai.com/docs/api-reference/chat
//!
//! ```no_run
//! use tradeflow_runtime::{HttpInvoker, InvokerConfig};
//!
//! # fn main() -> tradeflow_runtime::Result<()> {
//! // Local LM Studio / vLLM / llama.cpp server
//! let config = InvokerConfig::default()
//!     .with_api_base("http://localhost:1234/v1")
//!     .with_model("qwen2.5-7b-instruct");
//!
//! let invoker = HttpInvoker::with_config(config)?;
//! # Ok(())
//! # }
//! ```

use crate::config::InvokerConfig;
use crate::error::Result;
use crate::session::{ChatMessage, SessionStore};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use tradeflow_core::{AgentInvoker, Error, Invocation, Role, RunId};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// [`AgentInvoker`] that talks to an OpenAI-compatible endpoint
///
/// Conversation state lives in an in-memory [`SessionStore`]; every request
/// replays the session's history before the new prompt.
pub struct HttpInvoker {
    client: Client,
    config: InvokerConfig,
    sessions: SessionStore,
    rate_limiter: SharedRateLimiter,
}

impl HttpInvoker {
    /// Create an invoker with custom configuration
    pub fn with_config(config: InvokerConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            config,
            sessions: SessionStore::new(),
            rate_limiter,
        })
    }

    /// Create an invoker from environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(InvokerConfig::from_env())
    }

    /// Get the current configuration
    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Live sessions
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn complete(
        &self,
        role: Role,
        messages: Vec<ChatMessage>,
        deadline: Instant,
    ) -> tradeflow_core::Result<String> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(budget)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(e, role, budget))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(describe_status(status, &body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    request_error(e, role, budget)
                } else {
                    Error::Transport(format!("failed to parse response: {e}"))
                }
            })?;

        if let Some(usage) = &body.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::Transport("response contained no content".to_string()))
    }
}

#[async_trait]
impl AgentInvoker for HttpInvoker {
    #[instrument(
        skip(self, invocation),
        fields(role = %invocation.role, session = %invocation.session, model = %self.config.model)
    )]
    async fn invoke(&self, invocation: Invocation) -> tradeflow_core::Result<String> {
        let lease = self.sessions.open(&invocation.session)?;

        if !invocation.toolset.is_empty() {
            debug!(
                tools = ?invocation.toolset.names(),
                "tool calling is not wired for chat completions, tools ignored"
            );
        }

        self.rate_limiter.until_ready().await;

        let mut messages = vec![ChatMessage::system(invocation.instructions)];
        messages.extend(lease.history());
        messages.push(ChatMessage::user(invocation.prompt.clone()));

        match self.complete(invocation.role, messages, invocation.deadline).await {
            Ok(text) => {
                lease.record(invocation.prompt, text.clone());
                Ok(text)
            }
            Err(err) => {
                warn!(error = %err, "invocation failed");
                Err(err)
            }
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn close_run(&self, run_id: RunId) {
        let closed = self.sessions.close_run(run_id);
        debug!(%run_id, closed, "sessions discarded");
    }
}

fn request_error(err: reqwest::Error, role: Role, budget: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout { role, after: budget }
    } else {
        Error::Transport(err.to_string())
    }
}

fn describe_status(status: StatusCode, body: &str) -> String {
    match status.as_u16() {
        401 | 403 => "authentication failed".to_string(),
        429 => format!("rate limit exceeded: {body}"),
        404 => format!("model or endpoint not found: {body}"),
        _ => format!("HTTP {status}: {body}"),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
