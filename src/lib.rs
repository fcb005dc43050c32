//! # AegisAI Decision Engine
//!
//! A multi-agent decision-analysis orchestration engine. A submitted
//! problem statement is driven through four sequential agents - Research,
//! Analysis, Risk, and Decision - with a durable per-analysis state
//! machine, an append-only reasoning trace, and both polling and push-based
//! status delivery.
//!
//! ## Features
//!
//! - **Sequential agent pipeline**: each agent consumes the accumulated
//!   context produced upstream; the Decision agent synthesizes a final
//!   GO / NO-GO / CONDITIONAL verdict
//! - **Durable state machine**: `pending -> researching -> analyzing ->
//!   assessing_risks -> deciding -> completed`, with `failed` reachable
//!   from any non-terminal state; terminal states are sticky
//! - **Append-only reasoning log**: every agent invocation is recorded
//!   with confidence, duration, and rationale
//! - **At-most-one finalize**: terminal writes race through a single
//!   compare-and-swap on status
//! - **Status fan-out**: per-analysis broadcast channels with a terminal
//!   event that closes the stream, plus plain polling against the store
//! - **History and statistics**: paginated listings and verdict/confidence
//!   aggregates
//!
//! ## Architecture
//!
//! ```text
//! HTTP client → axum server → Orchestrator → OpenRouter (HTTP)
//!                    ↓              ↓
//!               StatusBroadcaster  SQLite (state)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aegis_engine::{AppState, Config};
//! use aegis_engine::llm::LlmClient;
//! use aegis_engine::memory::NoopMemory;
//! use aegis_engine::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let llm = LlmClient::new(&config.llm, config.request.clone())?;
//!     let state = Arc::new(AppState::new(config, storage, llm, Arc::new(NoopMemory)));
//!     aegis_engine::server::serve(state).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// The four analysis agents and their shared infrastructure.
pub mod agents;
/// Status event fan-out for polling and subscription consumers.
pub mod broadcast;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// OpenRouter chat-completions client.
pub mod llm;
/// Long-term memory collaborator boundary.
pub mod memory;
/// Pipeline runner driving the per-analysis state machine.
pub mod orchestrator;
/// System prompts for the analysis agents.
pub mod prompts;
/// Append-only reasoning log and explanation rendering.
pub mod reasoning;
/// HTTP server and request handlers.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, SharedState};
