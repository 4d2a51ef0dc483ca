//! The `AgentInvoker` capability

use crate::session::{RunId, SessionKey};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Every named role the pipeline invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    BullishAnalyst,
    BearishAnalyst,
    TechnicalAnalyst,
    SentimentAnalyst,
    NewsAnalyst,
    FundamentalsAnalyst,
    BullResearcher,
    BearResearcher,
    DebateJudge,
    ResearchManager,
    AggressiveDebator,
    NeutralDebator,
    ConservativeDebator,
    RiskSynthesizer,
    Trader,
    Reflection,
}

impl Role {
    /// Stable identifier used in session keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullishAnalyst => "bullish_analyst",
            Self::BearishAnalyst => "bearish_analyst",
            Self::TechnicalAnalyst => "technical_analyst",
            Self::SentimentAnalyst => "sentiment_analyst",
            Self::NewsAnalyst => "news_analyst",
            Self::FundamentalsAnalyst => "fundamentals_analyst",
            Self::BullResearcher => "bull_researcher",
            Self::BearResearcher => "bear_researcher",
            Self::DebateJudge => "debate_judge",
            Self::ResearchManager => "research_manager",
            Self::AggressiveDebator => "aggressive_debator",
            Self::NeutralDebator => "neutral_debator",
            Self::ConservativeDebator => "conservative_debator",
            Self::RiskSynthesizer => "risk_synthesizer",
            Self::Trader => "trader",
            Self::Reflection => "reflection",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the tools a role may call during its turn
///
/// The engine only forwards the names; whether and how tools run is up to
/// the invoker implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolset(Vec<String>);

impl Toolset {
    /// A toolset with no tools
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a toolset from tool names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One turn to execute
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Role the turn is executed as
    pub role: Role,
    /// System instructions for the role
    pub instructions: String,
    /// Tools available during the turn
    pub toolset: Toolset,
    /// Isolated conversational session the turn belongs to
    pub session: SessionKey,
    /// The user prompt
    pub prompt: String,
    /// Point in time after which the result is no longer wanted
    pub deadline: Instant,
}

/// Capability that executes a single agent turn
///
/// Implementations own the language-generation mechanism. The pipeline owns
/// roles, instructions and prompt composition, and treats the returned text
/// as opaque.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Execute one turn and return the generated text
    async fn invoke(&self, invocation: Invocation) -> Result<String>;

    /// Get the invoker's name
    fn name(&self) -> &str;

    /// Discard every session opened for the given run (optional)
    async fn close_run(&self, _run_id: RunId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_identifiers() {
        assert_eq!(Role::BullResearcher.as_str(), "bull_researcher");
        assert_eq!(Role::FundamentalsAnalyst.to_string(), "fundamentals_analyst");

        let json = serde_json::to_string(&Role::RiskSynthesizer).unwrap();
        assert_eq!(json, "\"risk_synthesizer\"");
    }

    #[test]
    fn test_toolset() {
        let tools = Toolset::new(["web_search", "risk_model"]);
        assert_eq!(tools.names(), ["web_search", "risk_model"]);
        assert!(!tools.is_empty());
        assert!(Toolset::none().is_empty());
    }
}
