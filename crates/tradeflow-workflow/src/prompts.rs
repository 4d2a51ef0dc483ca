//! Role instructions and prompt templates
//!
//! Prompt bodies are MiniJinja templates compiled once into a shared
//! [`Environment`]. Failed slots are rendered through [`Slot::render`], so a
//! missing report shows up as `[unavailable: ...]` instead of being dropped.

use crate::debate::TranscriptEntry;
use crate::error::Result;
use crate::reports::ReportKind;
use crate::slot::Slot;
use minijinja::{Environment, context};
use serde::Serialize;
use tradeflow_core::{Role, Toolset};

const ANALYST: &str = "analyst";
const DEBATER: &str = "debater";
const JUDGE: &str = "judge";
const RESEARCH_MANAGER: &str = "research_manager";
const RISK_STANCE: &str = "risk_stance";
const RISK_SYNTHESIS: &str = "risk_synthesis";
const TRADER: &str = "trader";
const REFLECTION: &str = "reflection";

const REPORTS_BLOCK: &str = r"{% macro reports_block(reports) %}
{% for report in reports %}
## {{ report.name }} report
{{ report.body }}

{% endfor %}
{% endmacro %}";

const TEMPLATES: [(&str, &str); 8] = [
    (
        ANALYST,
        r"Prepare the {{ kind }} report for {{ subject }}.
Use your tools where they help and close with the few points that matter most for a trading decision.",
    ),
    (
        DEBATER,
        r"{% from 'reports' import reports_block %}
You are arguing the {{ side }} case for {{ subject }}.

{{ reports_block(reports) }}
{% if transcript %}
Debate so far:

{{ transcript }}
{% else %}
You open the debate.
{% endif %}
Make your strongest {{ side }} argument and answer the other side's latest points directly.",
    ),
    (
        JUDGE,
        r"You are judging the bull vs bear debate on {{ subject }}.
Full transcript:

{{ transcript }}
Start your reply with the verdict: Bull, Bear, Tie, or NO if neither side was convincing and another round is needed.
Follow it with a short justification.",
    ),
    (
        RESEARCH_MANAGER,
        r"The bull vs bear debate on {{ subject }} {% if verdict %}ended with the verdict: {{ verdict }}{% else %}reached {{ rounds }} rounds without a verdict{% endif %}.

{{ transcript }}
Summarize the strongest arguments of each side, point out where they disagree and which claims are weakly supported.
Close with the investment view the debate supports.",
    ),
    (
        RISK_STANCE,
        r"{% from 'reports' import reports_block %}
Assess the risk of a position in {{ subject }} from the {{ stance }} point of view.

{{ reports_block(reports) }}
{% for prior in prior_stances %}
## {{ prior.name }} stance
{{ prior.body }}

{% endfor %}
{% if prior_stances %}Respond to the stances above, then give{% else %}Give{% endif %} your {{ stance }} view on position sizing, downside and upside.",
    ),
    (
        RISK_SYNTHESIS,
        r"Three risk analysts assessed {{ subject }}.

{% for stance in stances %}
## {{ stance.name }} stance
{{ stance.body }}

{% endfor %}
Summarize the three views and compare them. Point out flaws or blind spots, then recommend a balanced risk posture.",
    ),
    (
        TRADER,
        r"{% from 'reports' import reports_block %}
Decide on a trade for {{ subject }}.

## Research synthesis
{{ synthesis }}

{{ reports_block(reports) }}
{% if risk %}
## Risk synthesis
{{ risk }}

{% endif %}
{% if feedback %}
A reviewer flagged your previous answer:
{{ feedback }}

Address this and only make claims the material above supports.
{% endif %}
Explain your reasoning, then end your response with exactly one of: BUY, HOLD, SELL.",
    ),
    (
        REFLECTION,
        r"{% from 'reports' import reports_block %}
Check the trader's recommendation for {{ subject }} against the research it was given.

## Research synthesis
{{ synthesis }}

{{ reports_block(reports) }}
{% if risk %}
## Risk synthesis
{{ risk }}

{% endif %}
## Trader's recommendation
{{ decision }}

Reply NO HALLUCINATION if every claim is supported by the material above.
Otherwise reply HALLUCINATION DETECTED and name the unsupported claims.",
    ),
];

/// System instructions for `role`
pub fn instructions(role: Role) -> &'static str {
    match role {
        Role::BullishAnalyst => {
            "You are a buy-side equity analyst. Collect the evidence that supports owning the stock: growth drivers, competitive advantages, catalysts."
        }
        Role::BearishAnalyst => {
            "You are a short-side equity analyst. Collect the evidence against owning the stock: valuation stretch, competitive threats, balance sheet and execution risks."
        }
        Role::TechnicalAnalyst => {
            "You are a technical analyst. Read trend, momentum and volatility indicators and report what they say about timing."
        }
        Role::SentimentAnalyst => {
            "You are a market sentiment analyst. Report how investors and the public currently feel about the company and how that mood is shifting."
        }
        Role::NewsAnalyst => {
            "You are a financial news analyst. Find the recent news that moves the stock and explain its likely impact."
        }
        Role::FundamentalsAnalyst => {
            "You are a fundamentals analyst. Review financial statements, filings and valuation ratios and report on the health of the business."
        }
        Role::BullResearcher => {
            "You are the bullish researcher in an investment debate. Argue for buying, grounded in the analyst reports, and rebut the bear's claims."
        }
        Role::BearResearcher => {
            "You are the bearish researcher in an investment debate. Argue against buying, grounded in the analyst reports, and rebut the bull's claims."
        }
        Role::DebateJudge => {
            "You are a neutral investment debate judge. Decide which side argued more convincingly from evidence. Answer NO when neither side did."
        }
        Role::ResearchManager => {
            "You are a research manager. Turn a finished investment debate into a balanced synthesis a trader can act on."
        }
        Role::AggressiveDebator => {
            "You are an aggressive risk analyst. Favor upside capture and argue for larger positions when the opportunity justifies it."
        }
        Role::NeutralDebator => {
            "You are a neutral risk analyst. Weigh upside against downside and argue for proportionate position sizing."
        }
        Role::ConservativeDebator => {
            "You are a conservative risk analyst. Put capital preservation first and argue for tight limits and hedges."
        }
        Role::RiskSynthesizer => {
            "You are a chief risk officer. Reconcile the views of your risk analysts into one recommendation."
        }
        Role::Trader => {
            "You are a trader. Make a single decision from the research you are given and always finish with BUY, HOLD or SELL."
        }
        Role::Reflection => {
            "You are a reviewer. Check a trader's rationale claim by claim against the research it was given and flag anything unsupported."
        }
    }
}

/// Tools `role` may call during its turn
pub fn toolset(role: Role) -> Toolset {
    match role {
        Role::TechnicalAnalyst => Toolset::new(["technical_indicators"]),
        Role::SentimentAnalyst => Toolset::new(["sentiment_indicators"]),
        Role::NewsAnalyst | Role::BullishAnalyst | Role::BearishAnalyst => {
            Toolset::new(["web_search"])
        }
        Role::FundamentalsAnalyst => Toolset::new(["fundamental_indicators", "sec_filings"]),
        Role::AggressiveDebator | Role::NeutralDebator | Role::ConservativeDebator => {
            Toolset::new(["risk_model"])
        }
        _ => Toolset::none(),
    }
}

/// Render a debate transcript as `Turn i [ROLE]:` blocks
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "Turn {} [{}]:\n{}\n\n",
                i + 1,
                entry.speaker.label(),
                entry.content.render()
            )
        })
        .collect()
}

#[derive(Serialize)]
struct Section<'a> {
    name: &'a str,
    body: String,
}

fn report_sections(reports: &[(ReportKind, Slot)]) -> Vec<Section<'static>> {
    reports
        .iter()
        .map(|(kind, slot)| Section {
            name: kind.as_str(),
            body: slot.render(),
        })
        .collect()
}

/// Everything the decision and reflection prompts are built from
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub synthesis: Slot,
    pub reports: Vec<(ReportKind, Slot)>,
    pub risk: Option<Slot>,
}

/// Compiled prompt templates
#[derive(Debug)]
pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    /// Compile every template
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("reports", REPORTS_BLOCK)?;
        for (name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    pub fn analyst(&self, kind: ReportKind, subject: &str) -> Result<String> {
        self.render(ANALYST, context! { kind => kind.as_str(), subject })
    }

    /// Bull or bear turn; `side` is "bull" or "bear"
    pub fn debater(
        &self,
        side: &str,
        subject: &str,
        reports: &[(ReportKind, Slot)],
        transcript: &[TranscriptEntry],
    ) -> Result<String> {
        self.render(
            DEBATER,
            context! {
                side,
                subject,
                reports => report_sections(reports),
                transcript => render_transcript(transcript),
            },
        )
    }

    pub fn judge(&self, subject: &str, transcript: &[TranscriptEntry]) -> Result<String> {
        self.render(
            JUDGE,
            context! { subject, transcript => render_transcript(transcript) },
        )
    }

    /// Synthesis of a finished debate; `verdict` is `None` when rounds ran out
    pub fn research_manager(
        &self,
        subject: &str,
        transcript: &[TranscriptEntry],
        verdict: Option<&str>,
        rounds: u32,
    ) -> Result<String> {
        self.render(
            RESEARCH_MANAGER,
            context! {
                subject,
                verdict,
                rounds,
                transcript => render_transcript(transcript),
            },
        )
    }

    /// One risk stance; `prior` holds the earlier stances in generation order
    pub fn risk_stance(
        &self,
        stance: &str,
        subject: &str,
        reports: &[(ReportKind, Slot)],
        prior: &[(&str, &Slot)],
    ) -> Result<String> {
        let prior_stances: Vec<Section<'_>> = prior
            .iter()
            .map(|(name, slot)| Section {
                name,
                body: slot.render(),
            })
            .collect();

        self.render(
            RISK_STANCE,
            context! {
                stance,
                subject,
                reports => report_sections(reports),
                prior_stances,
            },
        )
    }

    pub fn risk_synthesis(&self, subject: &str, stances: &[(&str, &Slot)]) -> Result<String> {
        let stances: Vec<Section<'_>> = stances
            .iter()
            .map(|(name, slot)| Section {
                name,
                body: slot.render(),
            })
            .collect();

        self.render(RISK_SYNTHESIS, context! { subject, stances })
    }

    /// Decision prompt; `feedback` carries the reviewer's objection on a retry
    pub fn trader(
        &self,
        subject: &str,
        decision: &DecisionContext,
        feedback: Option<&str>,
    ) -> Result<String> {
        self.render(
            TRADER,
            context! {
                subject,
                synthesis => decision.synthesis.render(),
                reports => report_sections(&decision.reports),
                risk => decision.risk.as_ref().map(Slot::render),
                feedback,
            },
        )
    }

    pub fn reflection(
        &self,
        subject: &str,
        decision: &DecisionContext,
        rationale: &str,
    ) -> Result<String> {
        self.render(
            REFLECTION,
            context! {
                subject,
                synthesis => decision.synthesis.render(),
                reports => report_sections(&decision.reports),
                risk => decision.risk.as_ref().map(Slot::render),
                decision => rationale,
            },
        )
    }
}
