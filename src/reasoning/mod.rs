//! Append-only reasoning log and explanation rendering.
//!
//! Every agent invocation is recorded as one [`AgentStep`]; the log is the
//! transparent record of how a decision was reached. Steps are never
//! updated or deleted, and step numbers are assigned in invocation order.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::{AgentKind, AgentOutput};
use crate::error::StorageResult;
use crate::storage::{AgentStep, Decision, KeyFactor, SqliteStorage, Storage};

/// Append-only ordered log of per-agent steps tied to an analysis.
#[derive(Clone)]
pub struct ReasoningLog {
    storage: SqliteStorage,
}

impl ReasoningLog {
    /// Create a log over the given storage backend
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    /// Record one agent invocation. The step number is assigned here, in
    /// strictly increasing invocation order.
    pub async fn append(
        &self,
        analysis_id: &str,
        kind: AgentKind,
        output: &AgentOutput,
    ) -> StorageResult<AgentStep> {
        let step = AgentStep::new(
            analysis_id,
            kind.name(),
            &output.action,
            &output.summary,
            &output.reasoning,
        )
        .with_confidence(output.confidence)
        .with_tools(output.tools_used.clone())
        .with_duration(output.duration_ms)
        .with_tokens(output.tokens_used);

        let step = self.storage.append_step(step).await?;

        info!(
            analysis_id = %analysis_id,
            step = step.step_number,
            agent = %step.agent,
            action = %step.action,
            confidence = %format!("{:.2}", step.confidence),
            duration_ms = step.duration_ms,
            "Reasoning step recorded"
        );

        Ok(step)
    }

    /// All recorded steps for an analysis, in step-number order
    pub async fn list(&self, analysis_id: &str) -> StorageResult<Vec<AgentStep>> {
        self.storage.get_steps(analysis_id).await
    }
}

/// A human-friendly rendering of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Headline recommendation.
    pub header: String,
    /// "positive" / "negative" / "neutral".
    pub sentiment: String,
    /// Confidence bucket ("Very High" .. "Very Low").
    pub confidence_level: String,
    /// Confidence as a percentage string.
    pub confidence_percentage: String,
    /// The decision's executive summary.
    pub summary: String,
    /// Positive factors supporting the decision.
    pub main_reasons: Vec<String>,
    /// Negative factors weighing against it.
    pub concerns: Vec<String>,
    /// Immediate next actions.
    pub next_actions: Vec<String>,
    /// Condensed agent timeline.
    pub timeline: Vec<TimelineEntry>,
}

/// One agent's contribution in the explanation timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Agent name without the " Agent" suffix.
    pub agent: String,
    /// What the agent concluded.
    pub action: String,
    /// The agent's confidence as a percentage string.
    pub confidence: String,
}

/// Generates user-friendly explanations from analysis results.
pub struct ExplanationGenerator;

impl ExplanationGenerator {
    /// Render a decision and its reasoning steps into an [`Explanation`]
    pub fn decision_explanation(decision: &Decision, steps: &[AgentStep]) -> Explanation {
        use crate::storage::{FactorImpact, Verdict};

        let (sentiment, header) = match decision.verdict {
            Verdict::Go => ("positive", "Recommendation: Proceed"),
            Verdict::NoGo => ("negative", "Recommendation: Do Not Proceed"),
            Verdict::Conditional => ("neutral", "Recommendation: Proceed with Conditions"),
        };

        let mut main_reasons = Vec::new();
        let mut concerns = Vec::new();
        for factor in &decision.key_factors {
            match factor {
                KeyFactor::Detailed(d) => match d.impact {
                    FactorImpact::Positive => main_reasons.push(d.factor.clone()),
                    FactorImpact::Negative => concerns.push(d.factor.clone()),
                    FactorImpact::Neutral => {}
                },
                // Bare-string factors carry no impact direction
                KeyFactor::Simple(_) => {}
            }
        }

        let timeline = steps
            .iter()
            .map(|step| TimelineEntry {
                agent: step.agent.replace(" Agent", ""),
                action: step.summary.clone(),
                confidence: format!("{:.0}%", step.confidence * 100.0),
            })
            .collect();

        Explanation {
            header: header.to_string(),
            sentiment: sentiment.to_string(),
            confidence_level: Self::confidence_to_text(decision.confidence).to_string(),
            confidence_percentage: format!("{:.0}%", decision.confidence * 100.0),
            summary: decision.summary.clone(),
            main_reasons,
            concerns,
            next_actions: decision.next_steps.clone(),
            timeline,
        }
    }

    /// Convert a confidence score to human-readable text
    fn confidence_to_text(confidence: f64) -> &'static str {
        if confidence >= 0.9 {
            "Very High"
        } else if confidence >= 0.75 {
            "High"
        } else if confidence >= 0.6 {
            "Moderate"
        } else if confidence >= 0.4 {
            "Low"
        } else {
            "Very Low"
        }
    }
}
