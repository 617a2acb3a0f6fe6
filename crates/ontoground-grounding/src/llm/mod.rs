//! Language model interface
//!
//! The pipeline only ever needs plain-text completions: the ranking prompt,
//! the synonym prompt and the extraction prompt all return free text that is
//! parsed defensively by the caller. Concrete HTTP clients live in
//! `providers` behind the `openai` / `anthropic` / `local` features.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(any(feature = "openai", feature = "anthropic", feature = "local"))]
pub mod providers;

// ============================================================================
// LLM Provider Interface
// ============================================================================

/// Trait for LLM API providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError>;

    /// Get model info
    fn model_info(&self) -> ModelInfo;
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// A system + user exchange, the shape every grounding prompt uses.
    pub fn system_user(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![
                Message {
                    role: Role::System,
                    content: system.into(),
                },
                Message {
                    role: Role::User,
                    content: user.into(),
                },
            ],
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Concatenated content of all user messages.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub max_tokens: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
}

// ============================================================================
// Mock Provider
// ============================================================================

/// Scripted provider for tests and offline runs.
///
/// Responses are returned in order and cycle; every request is recorded so
/// tests can assert on prompt content.
pub struct MockProvider {
    responses: Vec<String>,
    response_idx: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            response_idx: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.requests.lock().push(request);
        if self.responses.is_empty() {
            return Err(LLMError::Api("mock provider has no scripted responses".to_string()));
        }
        let idx = self.response_idx.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: self.responses[idx % self.responses.len()].clone(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: "mock".to_string(),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "mock".to_string(),
            max_tokens: 4096,
        }
    }
}
