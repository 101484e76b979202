//! HTTP backends for OpenAI, Gemini and Anthropic endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use digest_types::{BackendSettings, ProviderKind};

use super::{BackendError, SummaryBackend};

/// Configuration for an HTTP backend.
#[derive(Debug, Clone)]
pub struct ApiBackendConfig {
    /// Which API dialect to speak
    pub provider: ProviderKind,

    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "gpt-4", "gemini-pro")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Attempts per request; 1 means no retry
    pub max_attempts: u32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl ApiBackendConfig {
    fn with_defaults(
        provider: ProviderKind,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(120),
            max_attempts: 1,
            max_tokens: 4000,
            temperature: 0.7,
        }
    }

    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_defaults(ProviderKind::OpenAi, "https://api.openai.com/v1", api_key, model)
    }

    /// Create config for Gemini API.
    pub fn gemini(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_defaults(
            ProviderKind::Gemini,
            "https://generativelanguage.googleapis.com/v1beta",
            api_key,
            model,
        )
    }

    /// Create config for Claude API.
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_defaults(
            ProviderKind::Anthropic,
            "https://api.anthropic.com/v1",
            api_key,
            model,
        )
    }

    /// Build from backend settings.
    ///
    /// Fails when no API key is configured or present in the provider's
    /// environment variable.
    pub fn from_settings(
        settings: &BackendSettings,
        kind: ProviderKind,
    ) -> Result<Self, BackendError> {
        let api_key = settings.resolve_api_key(kind).ok_or_else(|| {
            BackendError::Config(format!(
                "missing API key for {kind} (set backend.api_key or {})",
                kind.api_key_env().unwrap_or("an API key")
            ))
        })?;
        let model = settings.effective_model(kind);

        let mut config = match kind {
            ProviderKind::OpenAi => Self::openai(api_key, model),
            ProviderKind::Gemini => Self::gemini(api_key, model),
            ProviderKind::Anthropic => Self::claude(api_key, model),
            ProviderKind::Mock => {
                return Err(BackendError::Config(
                    "the mock provider has no HTTP backend".to_string(),
                ))
            }
        };

        if let Some(base_url) = &settings.api_base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.timeout = Duration::from_secs(settings.timeout_secs);
        config.max_attempts = settings.max_attempts.max(1);
        config.max_tokens = settings.max_tokens;
        config.temperature = settings.temperature;
        Ok(config)
    }
}

/// HTTP backend implementation.
pub struct ApiBackend {
    client: Client,
    config: ApiBackendConfig,
}

impl ApiBackend {
    /// Create a new HTTP backend.
    pub fn new(config: ApiBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiBackendConfig {
        &self.config
    }

    /// Call the API, retrying while attempts remain.
    async fn call_api(&self, instruction: &str, text: &str) -> Result<String, BackendError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                attempt = attempts,
                provider = %self.config.provider,
                model = %self.config.model,
                "Calling generation API"
            );

            match self.make_request(instruction, text).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempts >= self.config.max_attempts {
                        error!(error = %e, attempts, "Generation request failed");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "API call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn make_request(&self, instruction: &str, text: &str) -> Result<String, BackendError> {
        match self.config.provider {
            ProviderKind::OpenAi => self.make_openai_request(instruction, text).await,
            ProviderKind::Gemini => self.make_gemini_request(instruction, text).await,
            ProviderKind::Anthropic => self.make_anthropic_request(instruction, text).await,
            ProviderKind::Mock => Err(BackendError::Config(
                "the mock provider has no HTTP backend".to_string(),
            )),
        }
    }

    /// Make OpenAI chat completions request.
    async fn make_openai_request(
        &self,
        instruction: &str,
        text: &str,
    ) -> Result<String, BackendError> {
        #[derive(Serialize)]
        struct OpenAIRequest {
            model: String,
            messages: Vec<OpenAIMessage>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Serialize)]
        struct OpenAIMessage {
            role: String,
            content: String,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAIMessageResponse {
            content: Option<String>,
        }

        let request = OpenAIRequest {
            model: self.config.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;

        let response_body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Parse("No choices in response".to_string()))
    }

    /// Make Gemini generateContent request.
    ///
    /// Gemini gets the instruction and the text as one prompt.
    async fn make_gemini_request(
        &self,
        instruction: &str,
        text: &str,
    ) -> Result<String, BackendError> {
        #[derive(Serialize)]
        struct GeminiRequest {
            contents: Vec<GeminiContent>,
            #[serde(rename = "generationConfig")]
            generation_config: GeminiGenerationConfig,
        }

        #[derive(Serialize)]
        struct GeminiContent {
            role: String,
            parts: Vec<GeminiPart>,
        }

        #[derive(Serialize, Deserialize)]
        struct GeminiPart {
            #[serde(default)]
            text: Option<String>,
        }

        #[derive(Serialize)]
        struct GeminiGenerationConfig {
            #[serde(rename = "maxOutputTokens")]
            max_output_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct GeminiResponse {
            #[serde(default)]
            candidates: Vec<GeminiCandidate>,
        }

        #[derive(Deserialize)]
        struct GeminiCandidate {
            content: GeminiCandidateContent,
        }

        #[derive(Deserialize)]
        struct GeminiCandidateContent {
            #[serde(default)]
            parts: Vec<GeminiPart>,
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Some(format!("{instruction}\n\n{text}")),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;

        let response_body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        let candidate = response_body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Parse("No candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            return Err(BackendError::Parse("Empty candidate in response".to_string()));
        }
        Ok(text)
    }

    /// Make Anthropic messages request.
    async fn make_anthropic_request(
        &self,
        instruction: &str,
        text: &str,
    ) -> Result<String, BackendError> {
        #[derive(Serialize)]
        struct AnthropicRequest {
            model: String,
            max_tokens: u32,
            temperature: f32,
            system: String,
            messages: Vec<AnthropicMessage>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage {
            role: String,
            content: String,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: Option<String>,
        }

        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: instruction.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: text.to_string(),
            }],
        };

        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;

        let response_body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        response_body
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| BackendError::Parse("No content in response".to_string()))
    }
}

/// Map rate limiting and non-success statuses to errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if response.status() == 429 {
        return Err(BackendError::RateLimited);
    }

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Api(format!("HTTP {}: {}", status, body)));
    }

    Ok(response)
}

#[async_trait]
impl SummaryBackend for ApiBackend {
    async fn generate(&self, instruction: &str, text: &str) -> Result<String, BackendError> {
        self.call_api(instruction, text).await
    }

    fn name(&self) -> &str {
        self.config.provider.as_str()
    }
}
