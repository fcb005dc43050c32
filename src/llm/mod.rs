//! OpenRouter chat-completions client used by the analysis agents.
//!
//! Each agent delegates its cognitive work to a single chat completion call;
//! this module owns the wire types, timeouts, and retry behavior for that
//! boundary.

mod client;
mod types;

pub use client::LlmClient;
pub use types::{ChatChoice, ChatMessage, ChatRequest, ChatResponse, Completion, Usage};
