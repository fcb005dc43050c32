use serde::{Deserialize, Serialize};

/// A single chat message in the OpenRouter request format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role ("system", "user", "assistant")
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the chat completions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier (e.g. "openai/gpt-4o-mini")
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum completion tokens
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Create a new chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token limit
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A single completion choice in the response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    /// The generated message
    pub message: ChatMessage,
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: i64,
    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: i64,
    /// Total tokens billed
    #[serde(default)]
    pub total_tokens: i64,
}

/// Response body from the chat completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Completion choices (the client uses the first)
    pub choices: Vec<ChatChoice>,
    /// Token usage, when reported
    pub usage: Option<Usage>,
}

/// The distilled outcome of one chat completion call
#[derive(Debug, Clone)]
pub struct Completion {
    /// The assistant's text output
    pub content: String,
    /// Total tokens consumed by the call
    pub tokens_used: i64,
    /// Wall time of the call in milliseconds
    pub latency_ms: i64,
}
