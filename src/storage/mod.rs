//! Storage layer for analysis persistence.
//!
//! This module provides the domain types for analyses, reasoning steps,
//! decisions, and feedback, plus the [`Storage`] trait and its SQLite
//! implementation. The store is the single source of truth: every other
//! component reads and writes through it.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, StorageResult};

/// Minimum accepted problem statement length, in characters
pub const MIN_PROBLEM_LEN: usize = 20;
/// Maximum accepted problem statement length, in characters
pub const MAX_PROBLEM_LEN: usize = 5000;
/// Maximum accepted context length, in characters
pub const MAX_CONTEXT_LEN: usize = 2000;

/// Lifecycle state of an analysis.
///
/// `Completed` and `Failed` are terminal and sticky: once a record reaches
/// either, no further transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Created, pipeline not yet started.
    Pending,
    /// Research agent running.
    Researching,
    /// Analysis agent running.
    Analyzing,
    /// Risk agent running.
    AssessingRisks,
    /// Decision agent running.
    Deciding,
    /// Pipeline finished with a decision.
    Completed,
    /// Pipeline aborted by an agent failure.
    Failed,
}

impl AnalysisStatus {
    /// Whether this status is terminal (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Deterministic display progress for this state.
    ///
    /// `Failed` has no fixed percentage (it depends on where the run
    /// stopped) and returns `None`; use [`failed_progress`] with the
    /// completed step count instead.
    pub fn progress_percentage(&self) -> Option<u8> {
        match self {
            AnalysisStatus::Pending => Some(0),
            AnalysisStatus::Researching => Some(25),
            AnalysisStatus::Analyzing => Some(50),
            AnalysisStatus::AssessingRisks => Some(75),
            AnalysisStatus::Deciding => Some(90),
            AnalysisStatus::Completed => Some(100),
            AnalysisStatus::Failed => None,
        }
    }
}

/// Progress of a failed run: the percentage of the stage that was active
/// when the failure happened, derived from how many steps completed.
pub fn failed_progress(completed_steps: usize) -> u8 {
    const STAGES: [u8; 4] = [25, 50, 75, 90];
    STAGES[completed_steps.min(STAGES.len() - 1)]
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "pending"),
            AnalysisStatus::Researching => write!(f, "researching"),
            AnalysisStatus::Analyzing => write!(f, "analyzing"),
            AnalysisStatus::AssessingRisks => write!(f, "assessing_risks"),
            AnalysisStatus::Deciding => write!(f, "deciding"),
            AnalysisStatus::Completed => write!(f, "completed"),
            AnalysisStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AnalysisStatus::Pending),
            "researching" => Ok(AnalysisStatus::Researching),
            "analyzing" => Ok(AnalysisStatus::Analyzing),
            "assessing_risks" => Ok(AnalysisStatus::AssessingRisks),
            "deciding" => Ok(AnalysisStatus::Deciding),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            _ => Err(format!("Unknown analysis status: {}", s)),
        }
    }
}

/// One end-to-end run of the four-agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Unique analysis identifier.
    pub id: String,
    /// The submitted problem statement.
    pub problem_statement: String,
    /// Optional caller-supplied context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Current lifecycle state.
    pub status: AnalysisStatus,
    /// When the analysis was created.
    pub created_at: DateTime<Utc>,
    /// When the analysis reached a terminal state. Set exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Rolling digest written by the Research agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_summary: Option<String>,
    /// Rolling digest written by the Analysis agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<String>,
    /// Rolling digest written by the Risk agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_summary: Option<String>,
    /// Failure reason for failed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final result; present only for completed analyses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// Sum of all step durations, set at terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<i64>,
    /// Sum of all step token counts, set at terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
}

impl AnalysisRecord {
    /// Create a new pending analysis, validating the caller input.
    pub fn new(
        problem_statement: impl Into<String>,
        context: Option<String>,
    ) -> Result<Self, AppError> {
        let problem_statement = problem_statement.into();
        let len = problem_statement.chars().count();

        if len < MIN_PROBLEM_LEN {
            return Err(AppError::Validation {
                field: "problem_statement".to_string(),
                reason: format!("must be at least {} characters", MIN_PROBLEM_LEN),
            });
        }
        if len > MAX_PROBLEM_LEN {
            return Err(AppError::Validation {
                field: "problem_statement".to_string(),
                reason: format!("must be at most {} characters", MAX_PROBLEM_LEN),
            });
        }
        if let Some(ctx) = &context {
            if ctx.chars().count() > MAX_CONTEXT_LEN {
                return Err(AppError::Validation {
                    field: "context".to_string(),
                    reason: format!("must be at most {} characters", MAX_CONTEXT_LEN),
                });
            }
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            problem_statement,
            context,
            status: AnalysisStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            research_summary: None,
            analysis_summary: None,
            risk_summary: None,
            error: None,
            result: None,
            total_duration_ms: None,
            tokens_used: None,
        })
    }
}

/// Final result of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The synthesized decision, absent only for failed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Full ordered reasoning trace.
    pub reasoning_steps: Vec<AgentStep>,
}

/// The recorded output of one agent invocation, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    /// Unique step identifier.
    pub id: String,
    /// Owning analysis ID.
    pub analysis_id: String,
    /// 1-based position in invocation order, assigned at append time.
    pub step_number: i64,
    /// Display name of the agent that produced this step.
    #[serde(alias = "agent_name")]
    pub agent: String,
    /// Short description of what the agent did.
    pub action: String,
    /// Human-readable output digest.
    #[serde(alias = "output_summary")]
    pub summary: String,
    /// Full free-text rationale.
    pub reasoning: String,
    /// Ordered tool identifiers invoked during the step.
    #[serde(default)]
    pub tools_used: Vec<String>,
    /// Confidence in [0, 1].
    #[serde(alias = "confidence_score")]
    pub confidence: f64,
    /// Wall time of the step in milliseconds.
    pub duration_ms: i64,
    /// Tokens consumed by the step's LLM call.
    #[serde(default)]
    pub tokens_used: i64,
    /// Step completion time.
    pub timestamp: DateTime<Utc>,
}

impl AgentStep {
    /// Create a new step. `step_number` is assigned by the reasoning log.
    pub fn new(
        analysis_id: impl Into<String>,
        agent: impl Into<String>,
        action: impl Into<String>,
        summary: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analysis_id: analysis_id.into(),
            step_number: 0,
            agent: agent.into(),
            action: action.into(),
            summary: summary.into(),
            reasoning: reasoning.into(),
            tools_used: Vec::new(),
            confidence: 0.7,
            duration_ms: 0,
            tokens_used: 0,
            timestamp: Utc::now(),
        }
    }

    /// Set the confidence, clamped to [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the tools used
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }

    /// Set the step duration
    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms.max(0);
        self
    }

    /// Set the tokens used
    pub fn with_tokens(mut self, tokens_used: i64) -> Self {
        self.tokens_used = tokens_used;
        self
    }
}

/// Final categorical recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Proceed; benefits outweigh risks.
    #[serde(rename = "GO")]
    Go,
    /// Do not proceed.
    #[serde(rename = "NO-GO")]
    NoGo,
    /// Proceed only if stated conditions are met.
    #[serde(rename = "CONDITIONAL")]
    Conditional,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Go => write!(f, "GO"),
            Verdict::NoGo => write!(f, "NO-GO"),
            Verdict::Conditional => write!(f, "CONDITIONAL"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GO" => Ok(Verdict::Go),
            "NO-GO" | "NO_GO" | "NOGO" => Ok(Verdict::NoGo),
            "CONDITIONAL" => Ok(Verdict::Conditional),
            _ => Err(format!("Unknown verdict: {}", s)),
        }
    }
}

/// Direction of a decision factor's influence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorImpact {
    /// Supports the decision.
    Positive,
    /// Works against the decision.
    Negative,
    /// Neither direction.
    Neutral,
}

/// Severity of an identified risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    /// Business-ending if not addressed.
    Critical,
    /// Significant impact on success.
    High,
    /// Notable impact but manageable.
    Medium,
    /// Minor impact, easily managed.
    Low,
}

/// Likelihood of a risk materializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProbability {
    /// More than 80% chance.
    VeryLikely,
    /// 50-80% chance.
    Likely,
    /// 20-50% chance.
    Possible,
    /// Less than 20% chance.
    Unlikely,
}

/// A structured key decision factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorDetail {
    /// Factor description.
    pub factor: String,
    /// Direction of influence.
    pub impact: FactorImpact,
    /// Weight in [0, 1].
    pub weight: f64,
    /// Why this factor matters.
    pub explanation: String,
}

/// A structured identified risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDetail {
    /// Risk category (market, technical, financial, ...).
    pub category: String,
    /// Risk description.
    pub description: String,
    /// Severity level.
    pub severity: RiskSeverity,
    /// Probability level.
    pub probability: RiskProbability,
    /// Mitigation strategy.
    pub mitigation: String,
    /// Impact score in [0, 1].
    pub impact_score: f64,
}

/// A key factor that is either a bare string or a structured entry.
///
/// Upstream payloads produce both forms; consumers pattern-match instead of
/// inspecting JSON shapes at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyFactor {
    /// Structured factor with impact and weight.
    Detailed(FactorDetail),
    /// Plain text factor.
    Simple(String),
}

impl KeyFactor {
    /// The factor text regardless of form
    pub fn text(&self) -> &str {
        match self {
            KeyFactor::Detailed(d) => &d.factor,
            KeyFactor::Simple(s) => s,
        }
    }
}

/// A risk that is either a bare string or a structured entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RiskEntry {
    /// Structured risk with severity and probability.
    Detailed(RiskDetail),
    /// Plain text risk.
    Simple(String),
}

impl RiskEntry {
    /// The risk description regardless of form
    pub fn text(&self) -> &str {
        match self {
            RiskEntry::Detailed(d) => &d.description,
            RiskEntry::Simple(s) => s,
        }
    }
}

/// The final synthesis produced by the Decision agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Categorical recommendation.
    pub verdict: Verdict,
    /// Executive summary.
    pub summary: String,
    /// Longer explanation of why the decision was made.
    #[serde(default)]
    pub detailed_explanation: String,
    /// Ordered key factors.
    #[serde(default)]
    pub key_factors: Vec<KeyFactor>,
    /// Ordered identified risks.
    #[serde(default)]
    pub risks: Vec<RiskEntry>,
    /// Ordered recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Ordered immediate next steps.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Overall confidence in [0, 1].
    #[serde(alias = "confidence_score")]
    pub confidence: f64,
}

/// Caller feedback on a completed analysis, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Unique feedback identifier.
    pub id: String,
    /// The analysis this feedback is about.
    pub analysis_id: String,
    /// Overall rating, 1-5.
    pub rating: i64,
    /// Accuracy rating, 1-5.
    pub accuracy_rating: i64,
    /// Helpfulness rating, 1-5.
    pub helpfulness_rating: i64,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Whether the caller believes the decision was correct.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_decision_correct: Option<bool>,
    /// Factors the caller thinks were missed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_factors: Option<String>,
    /// Risks the caller thinks were overestimated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overestimated_risks: Option<String>,
    /// Risks the caller thinks were underestimated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underestimated_risks: Option<String>,
    /// When the feedback was submitted.
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    /// Create new feedback with the three required ratings, each clamped to 1-5
    pub fn new(
        analysis_id: impl Into<String>,
        rating: i64,
        accuracy_rating: i64,
        helpfulness_rating: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analysis_id: analysis_id.into(),
            rating: rating.clamp(1, 5),
            accuracy_rating: accuracy_rating.clamp(1, 5),
            helpfulness_rating: helpfulness_rating.clamp(1, 5),
            comment: None,
            was_decision_correct: None,
            missing_factors: None,
            overestimated_risks: None,
            underestimated_risks: None,
            created_at: Utc::now(),
        }
    }

    /// Set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set whether the decision was judged correct
    pub fn with_decision_correct(mut self, correct: bool) -> Self {
        self.was_decision_correct = Some(correct);
        self
    }
}

/// Aggregate statistics over all analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Number of analyses ever created.
    pub total_analyses: i64,
    /// Number in `completed`.
    pub completed: i64,
    /// Number in any non-terminal state.
    pub pending: i64,
    /// Number in `failed`.
    pub failed: i64,
    /// Mean decision confidence over completed analyses; absent when there
    /// are none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
    /// Count per verdict among completed analyses.
    pub verdict_distribution: HashMap<String, i64>,
}

/// Condensed list entry for history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Analysis identifier.
    pub id: String,
    /// Full problem statement (callers may truncate for display).
    pub problem_statement: String,
    /// Current status.
    pub status: AnalysisStatus,
    /// Verdict, when completed with a decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Decision confidence, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Terminal time, when terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Which rolling summary column a stage digest belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSummary {
    /// `research_summary`
    Research,
    /// `analysis_summary`
    Analysis,
    /// `risk_summary`
    Risk,
}

/// Terminal outcome applied atomically by [`Storage::finalize`].
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// Terminal status to set (`Completed` or `Failed`).
    pub status: AnalysisStatus,
    /// The decision, for completed runs.
    pub decision: Option<Decision>,
    /// Failure reason, for failed runs.
    pub error: Option<String>,
    /// Sum of step durations.
    pub total_duration_ms: i64,
    /// Sum of step token counts.
    pub tokens_used: i64,
}

/// Storage trait for database operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // Analysis operations

    /// Insert a new analysis record.
    async fn create_analysis(&self, record: &AnalysisRecord) -> StorageResult<()>;
    /// Fetch an analysis; completed records carry their assembled result.
    async fn get_analysis(&self, id: &str) -> StorageResult<AnalysisRecord>;
    /// Apply a status transition. Terminal states are sticky: when the
    /// record is already terminal the call is a no-op and the current
    /// record is returned unchanged.
    async fn update_status(
        &self,
        id: &str,
        status: AnalysisStatus,
    ) -> StorageResult<AnalysisRecord>;
    /// Write a rolling stage summary.
    async fn set_stage_summary(
        &self,
        id: &str,
        stage: StageSummary,
        summary: &str,
    ) -> StorageResult<()>;
    /// Atomically move a record to a terminal state. Returns `true` when
    /// this call performed the transition, `false` when the record was
    /// already terminal (the lost race is recovered as a no-op).
    async fn finalize(&self, id: &str, outcome: &FinalizeOutcome) -> StorageResult<bool>;
    /// Delete an analysis and its steps. Returns whether it existed.
    async fn delete_analysis(&self, id: &str) -> StorageResult<bool>;
    /// List analyses ordered by creation time descending, with the total
    /// count matching the filter.
    async fn list_analyses(
        &self,
        limit: i64,
        offset: i64,
        status: Option<AnalysisStatus>,
    ) -> StorageResult<(Vec<HistoryItem>, i64)>;
    /// Aggregate statistics across all analyses.
    async fn stats(&self) -> StorageResult<AnalysisStats>;

    // Reasoning step operations

    /// Append a step, assigning the next step number for its analysis.
    /// Returns the stored step.
    async fn append_step(&self, step: AgentStep) -> StorageResult<AgentStep>;
    /// All steps for an analysis, ordered by step number.
    async fn get_steps(&self, analysis_id: &str) -> StorageResult<Vec<AgentStep>>;

    // Feedback operations

    /// Insert a feedback entry.
    async fn create_feedback(&self, feedback: &Feedback) -> StorageResult<()>;
    /// All feedback for an analysis, oldest first.
    async fn get_feedback_for_analysis(&self, analysis_id: &str) -> StorageResult<Vec<Feedback>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_validation_rejects_short_statement() {
        let err = AnalysisRecord::new("too short", None).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_record_validation_accepts_valid_statement() {
        let record =
            AnalysisRecord::new("Should we launch a subscription box for artisan coffee?", None)
                .unwrap();
        assert_eq!(record.status, AnalysisStatus::Pending);
        assert!(record.result.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_record_validation_rejects_oversized_context() {
        let err = AnalysisRecord::new(
            "A perfectly reasonable problem statement",
            Some("x".repeat(MAX_CONTEXT_LEN + 1)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Researching,
            AnalysisStatus::Analyzing,
            AnalysisStatus::AssessingRisks,
            AnalysisStatus::Deciding,
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
        ] {
            let parsed: AnalysisStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_progress_mapping() {
        assert_eq!(AnalysisStatus::Pending.progress_percentage(), Some(0));
        assert_eq!(AnalysisStatus::Researching.progress_percentage(), Some(25));
        assert_eq!(AnalysisStatus::Deciding.progress_percentage(), Some(90));
        assert_eq!(AnalysisStatus::Completed.progress_percentage(), Some(100));
        assert_eq!(AnalysisStatus::Failed.progress_percentage(), None);

        assert_eq!(failed_progress(0), 25);
        assert_eq!(failed_progress(2), 75);
        assert_eq!(failed_progress(3), 90);
        assert_eq!(failed_progress(10), 90);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AnalysisStatus::Completed.is_terminal());
        assert!(AnalysisStatus::Failed.is_terminal());
        assert!(!AnalysisStatus::Deciding.is_terminal());
    }

    #[test]
    fn test_verdict_serde_names() {
        assert_eq!(serde_json::to_string(&Verdict::NoGo).unwrap(), "\"NO-GO\"");
        let v: Verdict = serde_json::from_str("\"CONDITIONAL\"").unwrap();
        assert_eq!(v, Verdict::Conditional);
    }

    #[test]
    fn test_key_factor_accepts_both_forms() {
        let factors: Vec<KeyFactor> = serde_json::from_str(
            r#"["plain factor", {"factor": "structured", "impact": "positive", "weight": 0.9, "explanation": "why"}]"#,
        )
        .unwrap();
        assert_eq!(factors.len(), 2);
        assert!(matches!(&factors[0], KeyFactor::Simple(s) if s == "plain factor"));
        match &factors[1] {
            KeyFactor::Detailed(d) => {
                assert_eq!(d.impact, FactorImpact::Positive);
                assert_eq!(d.factor, "structured");
            }
            KeyFactor::Simple(_) => panic!("expected detailed factor"),
        }
        assert_eq!(factors[1].text(), "structured");
    }

    #[test]
    fn test_risk_entry_accepts_both_forms() {
        let risks: Vec<RiskEntry> = serde_json::from_str(
            r#"[{"category": "market", "description": "saturation", "severity": "high", "probability": "likely", "mitigation": "differentiate", "impact_score": 0.7}, "unstructured risk"]"#,
        )
        .unwrap();
        assert!(matches!(&risks[0], RiskEntry::Detailed(d) if d.severity == RiskSeverity::High));
        assert_eq!(risks[1].text(), "unstructured risk");
    }

    #[test]
    fn test_agent_step_legacy_aliases() {
        let json = r#"{
            "id": "s1",
            "analysis_id": "a1",
            "step_number": 1,
            "agent_name": "Research Agent",
            "action": "Executing Data Gatherer",
            "output_summary": "Market research completed",
            "reasoning": "because",
            "confidence_score": 0.85,
            "duration_ms": 1200,
            "timestamp": "2024-01-11T10:01:15Z"
        }"#;
        let step: AgentStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.agent, "Research Agent");
        assert_eq!(step.summary, "Market research completed");
        assert!((step.confidence - 0.85).abs() < f64::EPSILON);
        assert!(step.tools_used.is_empty());
    }

    #[test]
    fn test_decision_confidence_alias() {
        let json = r#"{"verdict": "GO", "summary": "ship it", "confidence_score": 0.9}"#;
        let decision: Decision = serde_json::from_str(json).unwrap();
        assert_eq!(decision.verdict, Verdict::Go);
        assert!((decision.confidence - 0.9).abs() < f64::EPSILON);
        assert!(decision.key_factors.is_empty());
    }
}
