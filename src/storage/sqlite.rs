use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    AgentStep, AnalysisRecord, AnalysisResult, AnalysisStats, AnalysisStatus, Decision, Feedback,
    FinalizeOutcome, HistoryItem, StageSummary, Storage,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance, for tests and ephemeral runs
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_record(&self, id: &str) -> StorageResult<Option<AnalysisRecord>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, problem_statement, context, status, created_at, completed_at,
                   research_summary, analysis_summary, risk_summary, error,
                   total_duration_ms, tokens_used
            FROM analyses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record: AnalysisRecord = row.into();

        // Completed records carry their assembled result; failed records
        // keep the partial step log queryable but expose no decision.
        if record.status == AnalysisStatus::Completed {
            let decision = self.fetch_decision(id).await?;
            let steps = self.get_steps(id).await?;
            record.result = Some(AnalysisResult {
                decision,
                reasoning_steps: steps,
            });
        }

        Ok(Some(record))
    }

    async fn fetch_decision(&self, id: &str) -> StorageResult<Option<Decision>> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT decision FROM analyses WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(raw
            .flatten()
            .and_then(|json| serde_json::from_str(&json).ok()))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_analysis(&self, record: &AnalysisRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analyses (id, problem_statement, context, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.problem_statement)
        .bind(&record.context)
        .bind(record.status.to_string())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> StorageResult<AnalysisRecord> {
        self.fetch_record(id)
            .await?
            .ok_or_else(|| StorageError::AnalysisNotFound {
                analysis_id: id.to_string(),
            })
    }

    async fn update_status(
        &self,
        id: &str,
        status: AnalysisStatus,
    ) -> StorageResult<AnalysisRecord> {
        // Terminal states are sticky: the guarded update leaves terminal
        // records untouched and the current record is returned as-is.
        let result = sqlx::query(
            r#"
            UPDATE analyses
            SET status = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(status.to_string())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(analysis_id = %id, requested = %status, "Status transition rejected (terminal record)");
        }

        self.get_analysis(id).await
    }

    async fn set_stage_summary(
        &self,
        id: &str,
        stage: StageSummary,
        summary: &str,
    ) -> StorageResult<()> {
        let query = match stage {
            StageSummary::Research => "UPDATE analyses SET research_summary = ? WHERE id = ?",
            StageSummary::Analysis => "UPDATE analyses SET analysis_summary = ? WHERE id = ?",
            StageSummary::Risk => "UPDATE analyses SET risk_summary = ? WHERE id = ?",
        };

        sqlx::query(query)
            .bind(summary)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn finalize(&self, id: &str, outcome: &FinalizeOutcome) -> StorageResult<bool> {
        if !outcome.status.is_terminal() {
            return Err(StorageError::Query {
                message: format!("finalize requires a terminal status, got {}", outcome.status),
            });
        }

        let decision_json = outcome
            .decision
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap_or_default());
        let verdict = outcome.decision.as_ref().map(|d| d.verdict.to_string());
        let confidence = outcome.decision.as_ref().map(|d| d.confidence);

        // Single compare-and-swap on status: at most one caller wins the
        // non-terminal -> terminal transition; every other caller observes
        // rows_affected == 0 and recovers as a no-op.
        let result = sqlx::query(
            r#"
            UPDATE analyses
            SET status = ?, completed_at = ?, decision = ?, verdict = ?,
                decision_confidence = ?, error = ?, total_duration_ms = ?, tokens_used = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(outcome.status.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(&decision_json)
        .bind(&verdict)
        .bind(confidence)
        .bind(&outcome.error)
        .bind(outcome.total_duration_ms)
        .bind(outcome.tokens_used)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost race from an unknown id
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => {
                debug!(analysis_id = %id, "Finalize lost the terminal race, recovered as no-op");
                Ok(false)
            }
            None => Err(StorageError::AnalysisNotFound {
                analysis_id: id.to_string(),
            }),
        }
    }

    async fn delete_analysis(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_analyses(
        &self,
        limit: i64,
        offset: i64,
        status: Option<AnalysisStatus>,
    ) -> StorageResult<(Vec<HistoryItem>, i64)> {
        let (rows, total): (Vec<HistoryRow>, i64) = match status {
            Some(status) => {
                let status = status.to_string();
                let rows = sqlx::query_as(
                    r#"
                    SELECT id, problem_statement, status, verdict, decision_confidence,
                           created_at, completed_at
                    FROM analyses
                    WHERE status = ?
                    ORDER BY created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(&status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                let total =
                    sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE status = ?")
                        .bind(&status)
                        .fetch_one(&self.pool)
                        .await?;

                (rows, total)
            }
            None => {
                let rows = sqlx::query_as(
                    r#"
                    SELECT id, problem_statement, status, verdict, decision_confidence,
                           created_at, completed_at
                    FROM analyses
                    ORDER BY created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                let total = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
                    .fetch_one(&self.pool)
                    .await?;

                (rows, total)
            }
        };

        Ok((rows.into_iter().map(|r| r.into()).collect(), total))
    }

    async fn stats(&self) -> StorageResult<AnalysisStats> {
        let total_analyses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
            .fetch_one(&self.pool)
            .await?;

        let completed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE status = 'completed'")
                .fetch_one(&self.pool)
                .await?;

        let failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;

        let average_confidence: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(decision_confidence)
            FROM analyses
            WHERE status = 'completed' AND decision_confidence IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let verdict_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT verdict, COUNT(*)
            FROM analyses
            WHERE status = 'completed' AND verdict IS NOT NULL
            GROUP BY verdict
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let verdict_distribution: HashMap<String, i64> = verdict_rows.into_iter().collect();

        Ok(AnalysisStats {
            total_analyses,
            completed,
            pending: total_analyses - completed - failed,
            failed,
            average_confidence,
            verdict_distribution,
        })
    }

    async fn append_step(&self, mut step: AgentStep) -> StorageResult<AgentStep> {
        // Number assignment and insert share a transaction so concurrent
        // appends for the same analysis never collide on step_number.
        let mut tx = self.pool.begin().await?;

        let next_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(step_number), 0) + 1 FROM reasoning_steps WHERE analysis_id = ?",
        )
        .bind(&step.analysis_id)
        .fetch_one(&mut *tx)
        .await?;

        step.step_number = next_number;

        let tools = serde_json::to_string(&step.tools_used).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO reasoning_steps
                (id, analysis_id, step_number, agent, action, summary, reasoning,
                 tools_used, confidence, duration_ms, tokens_used, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&step.id)
        .bind(&step.analysis_id)
        .bind(step.step_number)
        .bind(&step.agent)
        .bind(&step.action)
        .bind(&step.summary)
        .bind(&step.reasoning)
        .bind(&tools)
        .bind(step.confidence)
        .bind(step.duration_ms)
        .bind(step.tokens_used)
        .bind(step.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(step)
    }

    async fn get_steps(&self, analysis_id: &str) -> StorageResult<Vec<AgentStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(
            r#"
            SELECT id, analysis_id, step_number, agent, action, summary, reasoning,
                   tools_used, confidence, duration_ms, tokens_used, timestamp
            FROM reasoning_steps
            WHERE analysis_id = ?
            ORDER BY step_number ASC
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback
                (id, analysis_id, rating, accuracy_rating, helpfulness_rating, comment,
                 was_decision_correct, missing_factors, overestimated_risks,
                 underestimated_risks, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.id)
        .bind(&feedback.analysis_id)
        .bind(feedback.rating)
        .bind(feedback.accuracy_rating)
        .bind(feedback.helpfulness_rating)
        .bind(&feedback.comment)
        .bind(feedback.was_decision_correct)
        .bind(&feedback.missing_factors)
        .bind(&feedback.overestimated_risks)
        .bind(&feedback.underestimated_risks)
        .bind(feedback.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_feedback_for_analysis(&self, analysis_id: &str) -> StorageResult<Vec<Feedback>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, analysis_id, rating, accuracy_rating, helpfulness_rating, comment,
                   was_decision_correct, missing_factors, overestimated_risks,
                   underestimated_risks, created_at
            FROM feedback
            WHERE analysis_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    problem_statement: String,
    context: Option<String>,
    status: String,
    created_at: String,
    completed_at: Option<String>,
    research_summary: Option<String>,
    analysis_summary: Option<String>,
    risk_summary: Option<String>,
    error: Option<String>,
    total_duration_ms: Option<i64>,
    tokens_used: Option<i64>,
}

impl From<AnalysisRow> for AnalysisRecord {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            problem_statement: row.problem_statement,
            context: row.context,
            status: row.status.parse().unwrap_or(AnalysisStatus::Pending),
            created_at: parse_timestamp(&row.created_at),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
            research_summary: row.research_summary,
            analysis_summary: row.analysis_summary,
            risk_summary: row.risk_summary,
            error: row.error,
            result: None,
            total_duration_ms: row.total_duration_ms,
            tokens_used: row.tokens_used,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    problem_statement: String,
    status: String,
    verdict: Option<String>,
    decision_confidence: Option<f64>,
    created_at: String,
    completed_at: Option<String>,
}

impl From<HistoryRow> for HistoryItem {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            problem_statement: row.problem_statement,
            status: row.status.parse().unwrap_or(AnalysisStatus::Pending),
            verdict: row.verdict.and_then(|v| v.parse().ok()),
            confidence: row.decision_confidence,
            created_at: parse_timestamp(&row.created_at),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
        }
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: String,
    analysis_id: String,
    step_number: i64,
    agent: String,
    action: String,
    summary: String,
    reasoning: String,
    tools_used: String,
    confidence: f64,
    duration_ms: i64,
    tokens_used: i64,
    timestamp: String,
}

impl From<StepRow> for AgentStep {
    fn from(row: StepRow) -> Self {
        Self {
            id: row.id,
            analysis_id: row.analysis_id,
            step_number: row.step_number,
            agent: row.agent,
            action: row.action,
            summary: row.summary,
            reasoning: row.reasoning,
            tools_used: serde_json::from_str(&row.tools_used).unwrap_or_default(),
            confidence: row.confidence,
            duration_ms: row.duration_ms,
            tokens_used: row.tokens_used,
            timestamp: parse_timestamp(&row.timestamp),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: String,
    analysis_id: String,
    rating: i64,
    accuracy_rating: i64,
    helpfulness_rating: i64,
    comment: Option<String>,
    was_decision_correct: Option<bool>,
    missing_factors: Option<String>,
    overestimated_risks: Option<String>,
    underestimated_risks: Option<String>,
    created_at: String,
}

impl From<FeedbackRow> for Feedback {
    fn from(row: FeedbackRow) -> Self {
        Self {
            id: row.id,
            analysis_id: row.analysis_id,
            rating: row.rating,
            accuracy_rating: row.accuracy_rating,
            helpfulness_rating: row.helpfulness_rating,
            comment: row.comment,
            was_decision_correct: row.was_decision_correct,
            missing_factors: row.missing_factors,
            overestimated_risks: row.overestimated_risks,
            underestimated_risks: row.underestimated_risks,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
