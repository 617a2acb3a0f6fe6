//! LLM API Providers
//!
//! Concrete implementations for OpenAI, Anthropic, and local
//! OpenAI-compatible servers (Ollama, vLLM).

use super::*;
use reqwest::Client;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const LOCAL_LLM_URL_ENV: &str = "LOCAL_LLM_URL";
pub const LOCAL_LLM_MODEL_ENV: &str = "LOCAL_LLM_MODEL";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LLM configuration loaded from environment or config file
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
    Local,
}

impl LLMConfig {
    /// Load from environment variables.
    ///
    /// OpenAI wins over Anthropic, which wins over a local endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same precedence as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(OPENAI_API_KEY_ENV) {
            return Ok(Self {
                provider: Provider::OpenAI,
                api_key: key,
                model: get(OPENAI_MODEL_ENV).unwrap_or_else(|| "gpt-4o".to_string()),
                base_url: get(OPENAI_BASE_URL_ENV),
                timeout_secs: 60,
            });
        }

        if let Some(key) = get(ANTHROPIC_API_KEY_ENV) {
            return Ok(Self {
                provider: Provider::Anthropic,
                api_key: key,
                model: get(ANTHROPIC_MODEL_ENV)
                    .unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string()),
                base_url: None,
                timeout_secs: 60,
            });
        }

        if let Some(url) = get(LOCAL_LLM_URL_ENV) {
            return Ok(Self {
                provider: Provider::Local,
                api_key: String::new(),
                model: get(LOCAL_LLM_MODEL_ENV).unwrap_or_else(|| "default".to_string()),
                base_url: Some(url),
                timeout_secs: 120,
            });
        }

        Err(ConfigError::NoProviderConfigured)
    }

    /// Create OpenAI config
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::OpenAI,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
        }
    }

    /// Create Anthropic config
    pub fn anthropic(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
        }
    }

    /// Create local config
    pub fn local(url: &str, model: &str) -> Self {
        Self {
            provider: Provider::Local,
            api_key: String::new(),
            model: model.to_string(),
            base_url: Some(url.to_string()),
            timeout_secs: 120,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No LLM provider configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or LOCAL_LLM_URL")]
    NoProviderConfigured,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn http_client(config: &LLMConfig) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))
}

fn openai_messages(request: &CompletionRequest) -> Vec<serde_json::Value> {
    request
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                },
                "content": m.content
            })
        })
        .collect()
}

fn chat_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": openai_messages(request),
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    body
}

/// `Retry-After` seconds as milliseconds, defaulting to one minute.
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(60)
        .saturating_mul(1000)
}

async fn error_body(response: reqwest::Response) -> LLMError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    LLMError::Api(format!("{status}: {error_text}"))
}

// ============================================================================
// OpenAI Provider
// ============================================================================

pub struct OpenAIClient {
    client: Client,
    config: LLMConfig,
}

impl OpenAIClient {
    pub fn new(config: LLMConfig) -> Result<Self, ConfigError> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let url = format!(
            "{}/chat/completions",
            self.config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_OPENAI_BASE_URL)
                .trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&chat_body(&self.config.model, request))
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(LLMError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse("missing choices[0].message.content".to_string()))?
            .to_string();

        let finish_reason = match data["choices"][0]["finish_reason"].as_str() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage: Usage {
                prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: self.config.model.clone(),
        })
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

pub struct AnthropicClient {
    client: Client,
    config: LLMConfig,
}

impl AnthropicClient {
    pub fn new(config: LLMConfig) -> Result<Self, ConfigError> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let url = self.config.base_url.as_deref().unwrap_or(DEFAULT_ANTHROPIC_URL);

        let system = request
            .messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.clone());

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::System => return None,
                };
                Some(serde_json::json!({ "role": role, "content": m.content }))
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(1024),
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(LLMError::RateLimited {
                retry_after_ms: 60_000,
            });
        }

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        let content = data["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse("missing content[0].text".to_string()))?
            .to_string();

        let finish_reason = match data["stop_reason"].as_str() {
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage: Usage {
                prompt_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                completion_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: self.config.model.clone(),
        })
    }
}

// ============================================================================
// Local Provider (Ollama, vLLM, etc.)
// ============================================================================

pub struct LocalClient {
    client: Client,
    config: LLMConfig,
}

impl LocalClient {
    pub fn new(config: LLMConfig) -> Result<Self, ConfigError> {
        if config.base_url.is_none() {
            return Err(ConfigError::Invalid("local provider needs a base URL".to_string()));
        }
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| LLMError::Api("No base URL configured".to_string()))?;

        // OpenAI-compatible API (vLLM, Ollama in OpenAI mode)
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&chat_body(&self.config.model, request))
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse("missing choices[0].message.content".to_string()))?
            .to_string();

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: self.config.model.clone(),
        })
    }
}

// ============================================================================
// Unified Client
// ============================================================================

/// Unified LLM client that dispatches to the appropriate provider
pub enum UnifiedClient {
    OpenAI(OpenAIClient),
    Anthropic(AnthropicClient),
    Local(LocalClient),
}

impl UnifiedClient {
    /// Create from configuration
    pub fn from_config(config: LLMConfig) -> Result<Self, ConfigError> {
        Ok(match config.provider {
            Provider::OpenAI => Self::OpenAI(OpenAIClient::new(config)?),
            Provider::Anthropic => Self::Anthropic(AnthropicClient::new(config)?),
            Provider::Local => Self::Local(LocalClient::new(config)?),
        })
    }

    /// Create from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(LLMConfig::from_env()?)
    }

    fn config(&self) -> &LLMConfig {
        match self {
            Self::OpenAI(c) => &c.config,
            Self::Anthropic(c) => &c.config,
            Self::Local(c) => &c.config,
        }
    }
}

#[async_trait]
impl LLMProvider for UnifiedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        match self {
            Self::OpenAI(c) => c.complete(&request).await,
            Self::Anthropic(c) => c.complete(&request).await,
            Self::Local(c) => c.complete(&request).await,
        }
    }

    fn model_info(&self) -> ModelInfo {
        let config = self.config();
        let max_tokens = match config.provider {
            Provider::OpenAI => 128_000,
            Provider::Anthropic => 200_000,
            Provider::Local => 8_192,
        };
        ModelInfo {
            name: config.model.clone(),
            max_tokens,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
