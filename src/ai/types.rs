use serde::{Deserialize, Serialize};

/// Error type for recognition requests
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Server error: HTTP {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Where the text of a recognition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionSource {
    /// The configured vision endpoint answered.
    Remote,
    /// The endpoint was unreachable and a canned pattern was used instead.
    Fallback,
}

/// Raw text returned for one frame, before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub source: RecognitionSource,
}

impl Recognition {
    pub fn is_fallback(&self) -> bool {
        self.source == RecognitionSource::Fallback
    }
}

/// Configuration for the chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Optional bearer token; local llama.cpp / SmolVLM servers need none.
    pub api_key: Option<String>,
}
