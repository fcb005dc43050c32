use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::SharedState;
use crate::agents::AgentKind;
use crate::broadcast::StatusEvent;
use crate::error::{AppError, AppResult};
use crate::reasoning::{Explanation, ExplanationGenerator};
use crate::storage::{
    failed_progress, AgentStep, AnalysisRecord, AnalysisStats, AnalysisStatus, Feedback,
    HistoryItem, Storage,
};

/// Problem statements longer than this are truncated in history listings
const HISTORY_PREVIEW_LEN: usize = 100;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if matches!(self, AppError::Validation { .. }) {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Request to start a new analysis
#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    /// The problem statement to analyze
    pub problem_statement: String,
    /// Optional free-text context
    #[serde(default)]
    pub context: Option<String>,
}

/// Response to a successful analysis submission
#[derive(Debug, Serialize)]
pub struct CreateAnalysisResponse {
    /// The new analysis id
    pub id: String,
    /// Always `pending` at creation
    pub status: AnalysisStatus,
    /// Human-readable hint
    pub message: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Single-shot status poll response
#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    /// Analysis id
    pub id: String,
    /// Current status
    pub status: AnalysisStatus,
    /// Agent currently running, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    /// Action of the most recent step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Display progress, 0-100
    pub progress_percentage: u8,
    /// Human-readable progress line
    pub latest_update: String,
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /analysis` - create an analysis and start the pipeline in the
/// background. Returns immediately with the pending record's id.
pub async fn create_analysis(
    State(state): State<SharedState>,
    Json(request): Json<AnalysisRequest>,
) -> AppResult<Json<CreateAnalysisResponse>> {
    let record = AnalysisRecord::new(request.problem_statement, request.context)?;
    state
        .storage
        .create_analysis(&record)
        .await
        .map_err(AppError::from)?;

    state.broadcaster.register(&record.id);

    info!(analysis_id = %record.id, "Created analysis");

    let orchestrator = state.orchestrator.clone();
    let id = record.id.clone();
    tokio::spawn(async move {
        orchestrator.run(&id).await;
    });

    Ok(Json(CreateAnalysisResponse {
        id: record.id,
        status: record.status,
        message: "Analysis started. Use the status endpoint to track progress.".to_string(),
        created_at: record.created_at,
    }))
}

/// `GET /analysis/{id}` - the full analysis record
pub async fn get_analysis(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<AnalysisRecord>> {
    let record = state.storage.get_analysis(&id).await?;
    Ok(Json(record))
}

/// `DELETE /analysis/{id}` - remove a record and its steps
pub async fn delete_analysis(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let existed = state.storage.delete_analysis(&id).await?;
    if !existed {
        return Err(AppError::Storage(
            crate::error::StorageError::AnalysisNotFound { analysis_id: id },
        ));
    }

    Ok(Json(json!({ "message": format!("Analysis {} deleted", id) })))
}

/// `GET /analysis/{id}/status` - single-shot status poll
pub async fn get_analysis_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<AnalysisStatusResponse>> {
    let record = state.storage.get_analysis(&id).await?;
    let steps = state.storage.get_steps(&id).await?;
    Ok(Json(status_response(&record, &steps)))
}

fn status_response(record: &AnalysisRecord, steps: &[AgentStep]) -> AnalysisStatusResponse {
    let current_agent = AgentKind::for_status(record.status).map(|k| k.name().to_string());

    let progress = record
        .status
        .progress_percentage()
        .unwrap_or_else(|| failed_progress(steps.len()));

    let latest_update = match record.status {
        AnalysisStatus::Pending => "Analysis queued".to_string(),
        AnalysisStatus::Completed => "Analysis completed".to_string(),
        AnalysisStatus::Failed => record
            .error
            .clone()
            .map(|e| format!("Analysis failed: {}", e))
            .unwrap_or_else(|| "Analysis failed".to_string()),
        _ => format!(
            "Step {}: {}",
            steps.len(),
            current_agent.as_deref().unwrap_or("Processing")
        ),
    };

    AnalysisStatusResponse {
        id: record.id.clone(),
        status: record.status,
        current_agent,
        current_step: steps.last().map(|s| s.action.clone()),
        progress_percentage: progress,
        latest_update,
    }
}

fn status_snapshot_event(record: &AnalysisRecord, steps: &[AgentStep]) -> StatusEvent {
    let response = status_response(record, steps);
    StatusEvent {
        id: response.id,
        status: response.status,
        current_agent: response.current_agent,
        progress_percentage: response.progress_percentage,
        completed_steps: steps.len(),
        latest_update: response.latest_update,
        is_final: record.status.is_terminal(),
    }
}

fn sse_event(event: &StatusEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("{}"))
}

enum StreamPhase {
    Snapshot(Box<StatusEvent>, Option<broadcast::Receiver<StatusEvent>>),
    Live(broadcast::Receiver<StatusEvent>),
    Done,
}

/// `GET /analysis/{id}/status/stream` - server-push stream of status
/// events. The current state is emitted first; the stream closes after a
/// `final: true` event. Clients connecting after the terminal event receive
/// only the final snapshot.
pub async fn stream_analysis_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading the snapshot so no event published in
    // between is lost; a duplicate status display is harmless.
    let receiver = state.broadcaster.subscribe(&id);

    let record = state.storage.get_analysis(&id).await?;
    let steps = state.storage.get_steps(&id).await?;
    let snapshot = status_snapshot_event(&record, &steps);

    let stream = futures_util::stream::unfold(
        StreamPhase::Snapshot(Box::new(snapshot), receiver),
        |phase| async move {
            match phase {
                StreamPhase::Snapshot(event, receiver) => {
                    let next = if event.is_final {
                        StreamPhase::Done
                    } else {
                        match receiver {
                            Some(rx) => StreamPhase::Live(rx),
                            None => StreamPhase::Done,
                        }
                    };
                    Some((Ok(sse_event(&event)), next))
                }
                StreamPhase::Live(mut rx) => loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let next = if event.is_final {
                                StreamPhase::Done
                            } else {
                                StreamPhase::Live(rx)
                            };
                            return Some((Ok(sse_event(&event)), next));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Status subscriber lagged, continuing");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                },
                StreamPhase::Done => None,
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `GET /analysis/{id}/reasoning` - the reasoning timeline
pub async fn get_reasoning_timeline(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    // 404 before exposing an empty timeline for unknown ids
    state.storage.get_analysis(&id).await?;
    let steps = state.storage.get_steps(&id).await?;

    Ok(Json(json!({
        "analysis_id": id,
        "total_steps": steps.len(),
        "steps": steps,
    })))
}

/// `GET /analysis/{id}/explanation` - human-friendly explanation of a
/// completed analysis
pub async fn get_explanation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<Explanation>> {
    let record = state.storage.get_analysis(&id).await?;

    if record.status != AnalysisStatus::Completed {
        return Err(AppError::Validation {
            field: "status".to_string(),
            reason: format!("analysis not completed (current status: {})", record.status),
        });
    }

    let result = record.result.as_ref().ok_or_else(|| AppError::Internal {
        message: "completed analysis is missing its result".to_string(),
    })?;
    let decision = result.decision.as_ref().ok_or_else(|| AppError::Internal {
        message: "completed analysis is missing its decision".to_string(),
    })?;

    Ok(Json(ExplanationGenerator::decision_explanation(
        decision,
        &result.reasoning_steps,
    )))
}

/// History listing query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size, clamped to 1..=100
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset into the ordered listing
    #[serde(default)]
    pub offset: i64,
    /// Optional status filter
    #[serde(default)]
    pub status: Option<String>,
}

fn default_limit() -> i64 {
    10
}

/// History listing response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Page of analyses, newest first
    pub analyses: Vec<HistoryItem>,
    /// Total matching the filter
    pub total: i64,
    /// Effective page size
    pub limit: i64,
    /// Effective offset
    pub offset: i64,
}

/// `GET /history` - paginated, filterable analysis listing
pub async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let status = match &query.status {
        Some(raw) => Some(raw.parse::<AnalysisStatus>().map_err(|_| {
            AppError::Validation {
                field: "status".to_string(),
                reason: format!("unknown status filter: {}", raw),
            }
        })?),
        None => None,
    };

    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let (mut analyses, total) = state.storage.list_analyses(limit, offset, status).await?;

    for item in &mut analyses {
        if item.problem_statement.chars().count() > HISTORY_PREVIEW_LEN {
            let preview: String = item.problem_statement.chars().take(HISTORY_PREVIEW_LEN).collect();
            item.problem_statement = format!("{}...", preview);
        }
    }

    Ok(Json(HistoryResponse {
        analyses,
        total,
        limit,
        offset,
    }))
}

/// `GET /history/stats` - aggregate statistics
pub async fn get_history_stats(
    State(state): State<SharedState>,
) -> AppResult<Json<AnalysisStats>> {
    let stats = state.storage.stats().await?;
    Ok(Json(stats))
}

/// Request to submit feedback on a completed analysis
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// The analysis the feedback is about
    pub analysis_id: String,
    /// Overall rating, 1-5
    pub rating: i64,
    /// Accuracy rating, 1-5
    pub accuracy_rating: i64,
    /// Helpfulness rating, 1-5
    pub helpfulness_rating: i64,
    /// Free-text comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Whether the decision turned out correct
    #[serde(default)]
    pub was_decision_correct: Option<bool>,
    /// Factors the caller thinks were missed
    #[serde(default)]
    pub missing_factors: Option<String>,
    /// Risks the caller thinks were overestimated
    #[serde(default)]
    pub overestimated_risks: Option<String>,
    /// Risks the caller thinks were underestimated
    #[serde(default)]
    pub underestimated_risks: Option<String>,
}

/// Feedback acknowledgment
#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    /// Feedback id
    pub id: String,
    /// The analysis the feedback is about
    pub analysis_id: String,
    /// Overall rating
    pub rating: i64,
    /// Accuracy rating
    pub accuracy_rating: i64,
    /// Helpfulness rating
    pub helpfulness_rating: i64,
    /// The submitted comment, echoed back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Whether the memory collaborator recorded the feedback
    pub memory_updated: bool,
    /// What the system will adjust based on critical feedback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_notes: Option<String>,
}

fn validate_rating(field: &str, value: i64) -> AppResult<()> {
    if !(1..=5).contains(&value) {
        return Err(AppError::Validation {
            field: field.to_string(),
            reason: "must be between 1 and 5".to_string(),
        });
    }
    Ok(())
}

/// `POST /feedback` - record feedback and signal the memory collaborator
pub async fn submit_feedback(
    State(state): State<SharedState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<Json<FeedbackResponse>> {
    validate_rating("rating", request.rating)?;
    validate_rating("accuracy_rating", request.accuracy_rating)?;
    validate_rating("helpfulness_rating", request.helpfulness_rating)?;

    // Reject feedback for analyses this store has never seen
    state.storage.get_analysis(&request.analysis_id).await?;

    let mut feedback = Feedback::new(
        &request.analysis_id,
        request.rating,
        request.accuracy_rating,
        request.helpfulness_rating,
    );
    feedback.comment = request.comment;
    feedback.was_decision_correct = request.was_decision_correct;
    feedback.missing_factors = request.missing_factors;
    feedback.overestimated_risks = request.overestimated_risks;
    feedback.underestimated_risks = request.underestimated_risks;

    state.storage.create_feedback(&feedback).await?;

    let memory_updated = match state.memory.on_feedback(&feedback).await {
        Ok(updated) => updated,
        Err(e) => {
            warn!(analysis_id = %feedback.analysis_id, error = %e, "Memory hook failed for feedback");
            false
        }
    };

    let improvement_notes = improvement_notes(&feedback);

    info!(
        analysis_id = %feedback.analysis_id,
        feedback_id = %feedback.id,
        rating = feedback.rating,
        "Feedback recorded"
    );

    Ok(Json(FeedbackResponse {
        id: feedback.id,
        analysis_id: feedback.analysis_id,
        rating: feedback.rating,
        accuracy_rating: feedback.accuracy_rating,
        helpfulness_rating: feedback.helpfulness_rating,
        comment: feedback.comment,
        created_at: feedback.created_at,
        memory_updated,
        improvement_notes,
    }))
}

/// Improvement notes are generated only for critical feedback
fn improvement_notes(feedback: &Feedback) -> Option<String> {
    if feedback.rating >= 3 && feedback.accuracy_rating >= 3 {
        return None;
    }

    let mut notes: Vec<String> = Vec::new();
    if let Some(missing) = &feedback.missing_factors {
        notes.push(format!("Will consider: {}", missing));
    }
    if let Some(over) = &feedback.overestimated_risks {
        notes.push(format!("Noted overestimation in: {}", over));
    }
    if let Some(under) = &feedback.underestimated_risks {
        notes.push(format!("Will increase weight of: {}", under));
    }

    if notes.is_empty() {
        Some("Feedback recorded for improvement".to_string())
    } else {
        Some(notes.join(" | "))
    }
}

/// `GET /feedback/{analysis_id}` - all feedback for an analysis
pub async fn get_feedback_for_analysis(
    State(state): State<SharedState>,
    Path(analysis_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let feedback = state
        .storage
        .get_feedback_for_analysis(&analysis_id)
        .await?;

    let average_rating = if feedback.is_empty() {
        None
    } else {
        Some(feedback.iter().map(|f| f.rating as f64).sum::<f64>() / feedback.len() as f64)
    };

    Ok(Json(json!({
        "analysis_id": analysis_id,
        "total_feedback": feedback.len(),
        "average_rating": average_rating,
        "feedback": feedback,
    })))
}
