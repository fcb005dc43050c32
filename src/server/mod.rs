//! HTTP server exposing the analysis engine to the presentation layer.
//!
//! This module provides:
//! - Shared application state management
//! - The axum router over all analysis, history, and feedback endpoints
//! - The serve loop

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::broadcast::StatusBroadcaster;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::llm::LlmClient;
use crate::memory::MemoryHook;
use crate::orchestrator::Orchestrator;
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Status event fan-out.
    pub broadcaster: Arc<StatusBroadcaster>,
    /// Pipeline runner for background analysis execution.
    pub orchestrator: Arc<Orchestrator>,
    /// Long-term memory collaborator.
    pub memory: Arc<dyn MemoryHook>,
}

/// Shared handle to the application state
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        llm: LlmClient,
        memory: Arc<dyn MemoryHook>,
    ) -> Self {
        let broadcaster = Arc::new(StatusBroadcaster::new());
        let orchestrator = Arc::new(Orchestrator::new(
            storage.clone(),
            llm,
            broadcaster.clone(),
            memory.clone(),
        ));

        Self {
            config,
            storage,
            broadcaster,
            orchestrator,
            memory,
        }
    }
}

/// Build the HTTP router over the shared state
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analysis", post(create_analysis))
        .route("/analysis/:id", get(get_analysis).delete(delete_analysis))
        .route("/analysis/:id/status", get(get_analysis_status))
        .route("/analysis/:id/status/stream", get(stream_analysis_status))
        .route("/analysis/:id/reasoning", get(get_reasoning_timeline))
        .route("/analysis/:id/explanation", get(get_explanation))
        .route("/history", get(get_history))
        .route("/history/stats", get(get_history_stats))
        .route("/feedback", post(submit_feedback))
        .route("/feedback/:analysis_id", get(get_feedback_for_analysis))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: SharedState) -> AppResult<()> {
    let addr = SocketAddr::new(state.config.server.host, state.config.server.port);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Failed to bind {}: {}", addr, e),
        })?;

    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Server error: {}", e),
        })
}
