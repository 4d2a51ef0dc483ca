//! Bull vs bear debate with an independent judge
//!
//! The debate is an explicit state machine. [`next_turn`] is the whole
//! routing table; [`DebateEngine`] only executes turns and feeds the judge's
//! verdict back into it.
//!
//! ```text
//!   Bull ──► Bear ──► Judge ──► End        (bull / bear / tie, or rounds used up)
//!    ▲                  │
//!    └──────────────────┘                  (restart, round < max_rounds)
//! ```

use crate::error::Result;
use crate::prompts::Prompts;
use crate::reports::ReportKind;
use crate::slot::Slot;
use crate::turn::invoke_turn;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument, warn};
use tradeflow_core::{AgentInvoker, Role, RunContext};

/// Whose turn it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    Bull,
    Bear,
    Judge,
    End,
}

/// Judge's call on the debate so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No judgement yet
    None,
    Bull,
    Bear,
    Tie,
    /// Neither side convinced the judge
    Restart,
}

impl Verdict {
    /// Whether the verdict ends the debate on its own
    pub fn is_decisive(self) -> bool {
        matches!(self, Self::Bull | Self::Bear | Self::Tie)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Bull => "bull",
            Self::Bear => "bear",
            Self::Tie => "tie",
            Self::Restart => "restart",
        })
    }
}

/// Speaker of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Bull,
    Bear,
    Judge,
}

impl Speaker {
    pub fn role(self) -> Role {
        match self {
            Self::Bull => Role::BullResearcher,
            Self::Bear => Role::BearResearcher,
            Self::Judge => Role::DebateJudge,
        }
    }

    /// Upper-case label used in rendered transcripts
    pub fn label(self) -> &'static str {
        match self {
            Self::Bull => "BULL",
            Self::Bear => "BEAR",
            Self::Judge => "JUDGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub content: Slot,
}

/// How a debate ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateOutcome {
    /// The judge reached a verdict
    Concluded(Verdict),
    /// `max_rounds` was reached without one
    Exhausted,
}

/// Full state of one debate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    pub subject: String,
    pub context: Vec<(ReportKind, Slot)>,
    pub transcript: Vec<TranscriptEntry>,
    pub turn: Turn,
    pub round: u32,
    pub max_rounds: u32,
    pub verdict: Verdict,
}

impl DebateState {
    pub fn new(subject: impl Into<String>, context: Vec<(ReportKind, Slot)>, max_rounds: u32) -> Self {
        Self {
            subject: subject.into(),
            context,
            transcript: Vec::new(),
            turn: Turn::Bull,
            round: 0,
            max_rounds,
            verdict: Verdict::None,
        }
    }

    pub fn outcome(&self) -> DebateOutcome {
        if self.verdict.is_decisive() {
            DebateOutcome::Concluded(self.verdict)
        } else {
            DebateOutcome::Exhausted
        }
    }

    fn push(&mut self, speaker: Speaker, content: Slot) {
        self.transcript.push(TranscriptEntry { speaker, content });
    }
}

/// Parse the judge's answer
///
/// Case-insensitive: a leading "no" asks for another round, otherwise the
/// first of "bull", "bear", "tie" found anywhere wins. `None` when nothing
/// matches.
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let text = text.trim_start().to_lowercase();

    if text.starts_with("no") {
        Some(Verdict::Restart)
    } else if text.contains("bull") {
        Some(Verdict::Bull)
    } else if text.contains("bear") {
        Some(Verdict::Bear)
    } else if text.contains("tie") {
        Some(Verdict::Tie)
    } else {
        None
    }
}

/// Debate routing table
///
/// `round` is the number of completed bull/bear exchanges.
pub fn next_turn(turn: Turn, verdict: Verdict, round: u32, max_rounds: u32) -> Turn {
    match turn {
        Turn::Bull => Turn::Bear,
        Turn::Bear => Turn::Judge,
        Turn::Judge if verdict.is_decisive() || round >= max_rounds => Turn::End,
        Turn::Judge => Turn::Bull,
        Turn::End => Turn::End,
    }
}

/// Report kinds the debaters argue from
pub const DEBATE_CONTEXT: [ReportKind; 4] = [
    ReportKind::Technical,
    ReportKind::Sentiment,
    ReportKind::News,
    ReportKind::Fundamentals,
];

/// Drives one debate to its end, then has the research manager sum it up
pub struct DebateEngine<'a> {
    invoker: &'a dyn AgentInvoker,
    prompts: &'a Prompts,
}

impl<'a> DebateEngine<'a> {
    pub fn new(invoker: &'a dyn AgentInvoker, prompts: &'a Prompts) -> Self {
        Self { invoker, prompts }
    }

    /// Run the debate until a decisive verdict or `max_rounds`
    ///
    /// At least one round is always played; `max_rounds == 0` counts as 1.
    #[instrument(skip(self, ctx, context), fields(subject = %ctx.subject()))]
    pub async fn run(
        &self,
        ctx: &RunContext,
        context: Vec<(ReportKind, Slot)>,
        max_rounds: u32,
    ) -> Result<DebateState> {
        let mut state = DebateState::new(ctx.subject(), context, max_rounds.max(1));

        while state.turn != Turn::End {
            match state.turn {
                Turn::Bull => {
                    let content = self.argue(ctx, &state, Speaker::Bull).await?;
                    state.push(Speaker::Bull, content);
                }
                Turn::Bear => {
                    let content = self.argue(ctx, &state, Speaker::Bear).await?;
                    state.push(Speaker::Bear, content);
                    state.round += 1;
                }
                Turn::Judge => {
                    let prompt = self.prompts.judge(&state.subject, &state.transcript)?;
                    let session = ctx.session_key(Role::DebateJudge).at(state.round);
                    let content =
                        invoke_turn(ctx, self.invoker, Role::DebateJudge, session, prompt).await?;

                    state.verdict = match content.text().map(parse_verdict) {
                        Some(Some(verdict)) => verdict,
                        Some(None) => {
                            warn!(round = state.round, "judge verdict unparseable, treating as inconclusive");
                            Verdict::Restart
                        }
                        None => Verdict::Restart,
                    };
                    debug!(round = state.round, verdict = %state.verdict, "judge ruled");
                    state.push(Speaker::Judge, content);
                }
                Turn::End => {}
            }

            state.turn = next_turn(state.turn, state.verdict, state.round, state.max_rounds);
        }

        info!(
            rounds = state.round,
            verdict = %state.verdict,
            outcome = ?state.outcome(),
            "debate finished"
        );
        Ok(state)
    }

    /// Research manager's synthesis of a finished debate
    pub async fn synthesize(&self, ctx: &RunContext, state: &DebateState) -> Result<Slot> {
        let verdict = state.verdict.is_decisive().then(|| state.verdict.to_string());
        let prompt = self.prompts.research_manager(
            &state.subject,
            &state.transcript,
            verdict.as_deref(),
            state.round,
        )?;

        invoke_turn(
            ctx,
            self.invoker,
            Role::ResearchManager,
            ctx.session_key(Role::ResearchManager),
            prompt,
        )
        .await
    }

    async fn argue(&self, ctx: &RunContext, state: &DebateState, speaker: Speaker) -> Result<Slot> {
        let side = match speaker {
            Speaker::Bear => "bear",
            _ => "bull",
        };
        let prompt = self
            .prompts
            .debater(side, &state.subject, &state.context, &state.transcript)?;
        let role = speaker.role();

        invoke_turn(ctx, self.invoker, role, ctx.session_key(role).at(state.round), prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use crate::test_support::ScriptedInvoker;
    use std::time::Duration;
    use tokio_test::assert_err;
    use tradeflow_core::Error;

    fn context() -> Vec<(ReportKind, Slot)> {
        DEBATE_CONTEXT
            .iter()
            .map(|kind| (*kind, Slot::Filled(format!("OK:{kind}"))))
            .collect()
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("NO, neither convinced me"), Some(Verdict::Restart));
        assert_eq!(parse_verdict("  no"), Some(Verdict::Restart));
        assert_eq!(parse_verdict("Bull. Stronger evidence."), Some(Verdict::Bull));
        assert_eq!(parse_verdict("Verdict: Bear"), Some(Verdict::Bear));
        assert_eq!(parse_verdict("It's a TIE"), Some(Verdict::Tie));
        // first match wins
        assert_eq!(parse_verdict("bear case weaker than bull case"), Some(Verdict::Bull));
        assert_eq!(parse_verdict("undecided"), None);
    }

    #[test]
    fn test_next_turn() {
        assert_eq!(next_turn(Turn::Bull, Verdict::None, 0, 4), Turn::Bear);
        assert_eq!(next_turn(Turn::Bear, Verdict::None, 1, 4), Turn::Judge);
        assert_eq!(next_turn(Turn::Judge, Verdict::Restart, 1, 4), Turn::Bull);
        assert_eq!(next_turn(Turn::Judge, Verdict::Restart, 4, 4), Turn::End);
        assert_eq!(next_turn(Turn::Judge, Verdict::Tie, 1, 4), Turn::End);
        assert_eq!(next_turn(Turn::Judge, Verdict::Bull, 4, 4), Turn::End);
        assert_eq!(next_turn(Turn::End, Verdict::Bear, 2, 4), Turn::End);
    }

    #[tokio::test]
    async fn test_restart_until_max_rounds() {
        let invoker = ScriptedInvoker::new().reply(Role::DebateJudge, "NO");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 4)
            .await
            .unwrap();

        assert_eq!(state.round, 4);
        assert_eq!(state.transcript.len(), 12);
        assert_eq!(state.turn, Turn::End);
        assert_eq!(state.outcome(), DebateOutcome::Exhausted);

        for round in state.transcript.chunks(3) {
            let speakers: Vec<Speaker> = round.iter().map(|e| e.speaker).collect();
            assert_eq!(speakers, [Speaker::Bull, Speaker::Bear, Speaker::Judge]);
        }
    }

    #[tokio::test]
    async fn test_zero_max_rounds_plays_one_round() {
        let invoker = ScriptedInvoker::new().reply(Role::DebateJudge, "NO");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 0)
            .await
            .unwrap();

        assert_eq!(state.max_rounds, 1);
        assert_eq!(state.round, 1);
        assert!(state.round <= state.max_rounds);
        assert_eq!(state.transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_bull_verdict_ends_first_round() {
        let invoker = ScriptedInvoker::new().reply(Role::DebateJudge, "bull");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 4)
            .await
            .unwrap();

        assert_eq!(state.round, 1);
        assert_eq!(state.transcript.len(), 3);
        assert_eq!(state.verdict, Verdict::Bull);
        assert_eq!(state.outcome(), DebateOutcome::Concluded(Verdict::Bull));
    }

    #[tokio::test]
    async fn test_history_is_kept_across_rounds() {
        let invoker = ScriptedInvoker::new()
            .script(Role::DebateJudge, [Ok("No".to_string()), Ok("Tie".to_string())])
            .script(
                Role::BullResearcher,
                [Ok("first bull".to_string()), Ok("second bull".to_string())],
            );
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 4)
            .await
            .unwrap();

        assert_eq!(state.round, 2);
        assert_eq!(state.verdict, Verdict::Tie);

        let bear_prompts = invoker.prompts(Role::BearResearcher);
        assert!(bear_prompts[1].contains("first bull"));
        assert!(bear_prompts[1].contains("second bull"));

        let judge_calls = invoker.calls(Role::DebateJudge);
        assert_ne!(judge_calls[0].session, judge_calls[1].session);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_inconclusive() {
        let invoker = ScriptedInvoker::new().reply(Role::DebateJudge, "hard to say");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 2)
            .await
            .unwrap();

        assert_eq!(state.round, 2);
        assert_eq!(state.verdict, Verdict::Restart);
    }

    #[tokio::test]
    async fn test_failed_turn_becomes_entry() {
        let invoker = ScriptedInvoker::new()
            .fail(Role::BearResearcher, "connection reset")
            .reply(Role::DebateJudge, "bull");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let state = DebateEngine::new(&invoker, &prompts)
            .run(&ctx, context(), 4)
            .await
            .unwrap();

        assert_eq!(state.transcript.len(), 3);
        let bear = &state.transcript[1];
        assert_eq!(bear.speaker, Speaker::Bear);
        assert!(bear.content.failure().unwrap().contains("connection reset"));

        let judge_prompt = &invoker.prompts(Role::DebateJudge)[0];
        assert!(judge_prompt.contains("[unavailable: transport failure: connection reset]"));
    }

    #[tokio::test]
    async fn test_timeout_is_terminal() {
        let invoker = ScriptedInvoker::new().script(
            Role::DebateJudge,
            [Err(Error::Timeout {
                role: Role::DebateJudge,
                after: Duration::from_secs(1),
            })],
        );
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");

        let err = assert_err!(DebateEngine::new(&invoker, &prompts).run(&ctx, context(), 4).await);
        assert!(matches!(err, WorkflowError::Timeout { role: Role::DebateJudge, .. }));
    }

    #[tokio::test]
    async fn test_synthesis_sees_verdict() {
        let invoker = ScriptedInvoker::new()
            .reply(Role::DebateJudge, "bear")
            .reply(Role::ResearchManager, "bears carried it");
        let prompts = Prompts::new().unwrap();
        let ctx = RunContext::new("TEST");
        let engine = DebateEngine::new(&invoker, &prompts);

        let state = engine.run(&ctx, context(), 4).await.unwrap();
        let synthesis = engine.synthesize(&ctx, &state).await.unwrap();

        assert_eq!(synthesis.text(), Some("bears carried it"));
        assert!(invoker.prompts(Role::ResearchManager)[0].contains("ended with the verdict: bear"));
        assert_eq!(state.transcript.len(), 3);
    }
}
