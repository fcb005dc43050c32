//! The four analysis agents and their shared infrastructure.
//!
//! Every agent satisfies the same contract: consume the accumulated context
//! (problem statement plus all upstream payloads) and produce one
//! [`AgentOutput`]. Agents fail only when the LLM boundary fails; a
//! malformed completion degrades to a low-confidence fallback payload
//! instead of aborting the run.

mod analyst;
mod decision;
mod research;
mod risk;

pub use analyst::AnalystAgent;
pub use decision::DecisionAgent;
pub use research::ResearchAgent;
pub use risk::RiskAgent;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};
use crate::llm::{ChatMessage, Completion, LlmClient};
use crate::storage::{AnalysisStatus, Decision};

/// The four pipeline stages, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Gathers factual data about the problem.
    Research,
    /// Evaluates viability based on the research.
    Analysis,
    /// Identifies and scores risks.
    Risk,
    /// Synthesizes the final decision.
    Decision,
}

impl AgentKind {
    /// Display name recorded on reasoning steps
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Research => "Research Agent",
            AgentKind::Analysis => "Analysis Agent",
            AgentKind::Risk => "Risk Agent",
            AgentKind::Decision => "Decision Agent",
        }
    }

    /// Human role description
    pub fn role(&self) -> &'static str {
        match self {
            AgentKind::Research => "Data Gatherer",
            AgentKind::Analysis => "Strategic Analyst",
            AgentKind::Risk => "Risk Assessor",
            AgentKind::Decision => "Decision Maker",
        }
    }

    /// The pipeline status while this agent runs
    pub fn running_status(&self) -> AnalysisStatus {
        match self {
            AgentKind::Research => AnalysisStatus::Researching,
            AgentKind::Analysis => AnalysisStatus::Analyzing,
            AgentKind::Risk => AnalysisStatus::AssessingRisks,
            AgentKind::Decision => AnalysisStatus::Deciding,
        }
    }

    /// The agent active in a given status, if any
    pub fn for_status(status: AnalysisStatus) -> Option<AgentKind> {
        match status {
            AnalysisStatus::Researching => Some(AgentKind::Research),
            AnalysisStatus::Analyzing => Some(AgentKind::Analysis),
            AnalysisStatus::AssessingRisks => Some(AgentKind::Risk),
            AnalysisStatus::Deciding => Some(AgentKind::Decision),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output of one upstream agent, carried forward for downstream context.
#[derive(Debug, Clone)]
pub struct PriorStep {
    /// Which agent produced it.
    pub agent: AgentKind,
    /// Its step summary.
    pub summary: String,
    /// Its full structured payload.
    pub payload: Value,
}

/// Everything an agent sees when it runs.
///
/// Research sees only the raw problem; each later agent additionally sees
/// all upstream payloads in invocation order.
#[derive(Debug, Clone)]
pub struct AccumulatedContext {
    /// The submitted problem statement.
    pub problem_statement: String,
    /// Optional caller-supplied context.
    pub context: Option<String>,
    /// Upstream outputs in invocation order.
    pub prior: Vec<PriorStep>,
}

impl AccumulatedContext {
    /// Create a fresh context for a new run
    pub fn new(problem_statement: impl Into<String>, context: Option<String>) -> Self {
        Self {
            problem_statement: problem_statement.into(),
            context,
            prior: Vec::new(),
        }
    }

    /// Record an upstream output
    pub fn push(&mut self, agent: AgentKind, summary: impl Into<String>, payload: Value) {
        self.prior.push(PriorStep {
            agent,
            summary: summary.into(),
            payload,
        });
    }

    /// The payload produced by a specific upstream agent, if it ran
    pub fn payload_for(&self, agent: AgentKind) -> Option<&Value> {
        self.prior
            .iter()
            .find(|p| p.agent == agent)
            .map(|p| &p.payload)
    }
}

/// The result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Short description of what the agent did.
    pub action: String,
    /// Human-readable output digest.
    pub summary: String,
    /// Full free-text rationale.
    pub reasoning: String,
    /// Tool identifiers invoked during the step.
    pub tools_used: Vec<String>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Wall time of the invocation in milliseconds.
    pub duration_ms: i64,
    /// Tokens consumed by the LLM call.
    pub tokens_used: i64,
    /// Full structured payload, passed to downstream agents.
    pub payload: Value,
    /// Rolling record digest, for the agents that write one.
    pub stage_summary: Option<String>,
    /// The final decision, produced only by the Decision agent.
    pub decision: Option<Decision>,
}

/// Uniform agent contract: one capability, `run`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Which pipeline stage this agent implements.
    fn kind(&self) -> AgentKind;

    /// Execute the agent against the accumulated context.
    async fn run(&self, ctx: &AccumulatedContext) -> AgentResult<AgentOutput>;
}

/// Core infrastructure shared by all agents.
///
/// Wraps the LLM client so each agent only supplies its prompt, task
/// formatting, and payload handling.
#[derive(Clone)]
pub struct AgentCore {
    llm: LlmClient,
}

impl AgentCore {
    /// Create a new agent core around the given LLM client
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Run one completion for an agent, mapping failures to [`AgentError`]
    pub async fn complete(
        &self,
        kind: AgentKind,
        system_prompt: &str,
        task: String,
        temperature: f64,
        max_tokens: u32,
    ) -> AgentResult<Completion> {
        info!(agent = %kind, "Agent executing task");

        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(task)];

        self.llm
            .chat(messages, temperature, max_tokens)
            .await
            .map_err(|e| AgentError::Llm {
                agent: kind.name().to_string(),
                source: e,
            })
    }
}

/// Extract the outermost JSON object from a completion, tolerating
/// surrounding prose or code fences.
pub(crate) fn extract_json(completion: &str) -> Option<Value> {
    let start = completion.find('{')?;
    let end = completion.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&completion[start..=end]).ok()
}

/// Read a confidence value from a payload, accepting numbers or numeric
/// strings, clamped to [0, 1].
pub(crate) fn payload_confidence(payload: &Value, default: f64) -> f64 {
    let raw = match payload.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    };
    raw.clamp(0.0, 1.0)
}

/// Flatten a payload list whose entries may be strings or objects into
/// plain strings, probing the common text-bearing keys.
pub(crate) fn extract_strings(value: Option<&Value>) -> Vec<String> {
    const TEXT_KEYS: [&str; 6] = [
        "factor",
        "risk",
        "recommendation",
        "step",
        "description",
        "text",
    ];

    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            Value::Object(map) => TEXT_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| item.to_string()),
            other => other.to_string(),
        })
        .collect()
}

/// Build a reasoning digest from an agent payload, probing the fields each
/// agent is known to emit.
pub(crate) fn build_reasoning(kind: AgentKind, payload: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(reasoning) = payload.get("reasoning").and_then(Value::as_str) {
        if !reasoning.is_empty() && reasoning != "Analysis completed." {
            parts.push(reasoning.to_string());
        }
    }

    if let Some(detailed) = payload.get("detailed_reasoning").and_then(Value::as_object) {
        if let Some(why) = detailed.get("why_this_decision").and_then(Value::as_str) {
            parts.push(format!("Rationale: {}", truncate(why, 150)));
        }
    }

    if let Some(market) = payload.get("market_overview").and_then(Value::as_object) {
        let mut market_info: Vec<String> = Vec::new();
        if let Some(size) = market.get("market_size").and_then(Value::as_str) {
            market_info.push(format!("Market size: {}", size));
        }
        if let Some(growth) = market.get("growth_rate").and_then(Value::as_str) {
            market_info.push(format!("Growth: {}", growth));
        }
        if !market_info.is_empty() {
            parts.push(market_info.join(" | "));
        }
    }

    if let Some(score) = payload.get("overall_analysis_score").and_then(Value::as_f64) {
        parts.push(format!("Overall viability score: {:.0}%", score * 100.0));
    }

    if let Some(score) = payload.get("overall_risk_score").and_then(Value::as_f64) {
        parts.push(format!("Overall risk level: {:.0}%", score * 100.0));
    }

    if let Some(verdict) = payload.get("verdict").and_then(Value::as_str) {
        let confidence = payload_confidence(payload, 0.0);
        parts.push(format!(
            "Reached decision: {} (confidence: {:.0}%)",
            verdict,
            confidence * 100.0
        ));
    }

    if parts.is_empty() {
        if let Some(summary) = payload.get("summary").and_then(Value::as_str) {
            parts.push(truncate(summary, 200).to_string());
        }
    }

    if parts.is_empty() {
        debug!(agent = %kind, "Payload yielded no reasoning fields, using fallback");
        return format!(
            "Completed {} analysis. Check the summary for key findings.",
            kind.name()
        );
    }

    parts.join(" | ")
}

/// Brief digest of an agent payload, used as the step summary.
pub(crate) fn summarize_payload(payload: &Value) -> String {
    if let Some(err) = payload.get("error").and_then(Value::as_str) {
        return format!("Error: {}", err);
    }
    if let Some(verdict) = payload.get("verdict").and_then(Value::as_str) {
        return format!(
            "Decision: {} (confidence: {:.2})",
            verdict,
            payload_confidence(payload, 0.0)
        );
    }
    if let Some(score) = payload.get("overall_risk_score").and_then(Value::as_f64) {
        return format!("Risk Score: {}", score);
    }
    if let Some(score) = payload.get("overall_analysis_score").and_then(Value::as_f64) {
        return format!("Analysis Score: {}", score);
    }
    if payload.get("market_overview").is_some() {
        return "Market research completed".to_string();
    }
    "Analysis completed".to_string()
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
