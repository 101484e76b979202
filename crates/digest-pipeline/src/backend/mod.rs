//! Summary backend trait and implementations.
//!
//! A backend turns an instruction plus input text into generated text.
//! HTTP adapters cover OpenAI, Gemini and Anthropic; the mock backend
//! serves tests and offline runs.

mod api;
mod mock;

pub use api::{ApiBackend, ApiBackendConfig};
pub use mock::{MockBackend, RecordedCall};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use digest_types::{BackendSettings, ProviderKind};

/// Prefix of the text recorded in place of a summary that failed.
pub const ERROR_MARKER_PREFIX: &str = "Error in summarization:";

/// Error type for backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for response")]
    Timeout,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Api(err.to_string())
        }
    }
}

/// Text generation capability used by the pipeline.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    /// Generate text for `text` following `instruction`.
    async fn generate(&self, instruction: &str, text: &str) -> Result<String, BackendError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Text recorded in place of a summary whose backend call failed.
pub fn error_marker(err: &BackendError) -> String {
    format!("{ERROR_MARKER_PREFIX} {err}")
}

/// Whether `text` is an error marker rather than a generated summary.
pub fn is_error_marker(text: &str) -> bool {
    text.starts_with(ERROR_MARKER_PREFIX)
}

/// Build the backend selected by `settings.provider`.
///
/// Unknown providers and missing API keys fail here, before any request.
pub fn build_backend(settings: &BackendSettings) -> Result<Arc<dyn SummaryBackend>, BackendError> {
    let kind = settings
        .provider_kind()
        .map_err(|e| BackendError::Config(e.to_string()))?;

    match kind {
        ProviderKind::Mock => Ok(Arc::new(MockBackend::new())),
        ProviderKind::OpenAi | ProviderKind::Gemini | ProviderKind::Anthropic => {
            let config = ApiBackendConfig::from_settings(settings, kind)?;
            Ok(Arc::new(ApiBackend::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_marker_format() {
        let marker = error_marker(&BackendError::Api("HTTP 500: boom".to_string()));
        assert_eq!(marker, "Error in summarization: API request failed: HTTP 500: boom");
        assert!(is_error_marker(&marker));
        assert!(!is_error_marker("A normal summary"));
    }

    #[test]
    fn test_build_mock_backend() {
        let backend = build_backend(&BackendSettings::mock()).unwrap();
        assert_eq!(backend.name(), "mock");
    }

    #[test]
    fn test_build_rejects_unknown_provider() {
        let settings = BackendSettings {
            provider: "llama".to_string(),
            ..BackendSettings::default()
        };
        let err = build_backend(&settings).err().unwrap();
        assert!(matches!(err, BackendError::Config(_)));
        assert!(err.to_string().contains("Unsupported AI provider"));
    }

    #[test]
    fn test_build_with_explicit_key() {
        let settings = BackendSettings {
            provider: "gemini".to_string(),
            api_key: Some("test-key".to_string()),
            ..BackendSettings::default()
        };
        let backend = build_backend(&settings).unwrap();
        assert_eq!(backend.name(), "gemini");
    }
}
