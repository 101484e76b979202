//! Configuration loading for convo-digest.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/convo-digest/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DigestError;

/// Language-model provider behind the summary backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Anthropic,
    /// Deterministic offline backend, no credentials needed
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Mock => "mock",
        }
    }

    /// Model used when `model_name` is not configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4",
            ProviderKind::Gemini => "gemini-pro",
            ProviderKind::Anthropic => "claude-3-haiku-20240307",
            ProviderKind::Mock => "mock",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Mock => None,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(DigestError::Config(format!(
                "Unsupported AI provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline does when a backend call fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record an error marker as the summary and keep going (default)
    #[default]
    Continue,
    /// Stop the run at the first failed call
    Abort,
}

/// Summary backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Provider name ("openai", "gemini", "anthropic", "mock")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name; provider default when unset
    #[serde(default)]
    pub model_name: Option<String>,

    /// Maximum tokens to generate per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// API key (usually taken from the provider's env var instead)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per request; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: None,
            api_base_url: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl BackendSettings {
    /// Settings for the offline mock backend.
    pub fn mock() -> Self {
        Self {
            provider: "mock".to_string(),
            ..Self::default()
        }
    }

    /// Parse the configured provider name.
    pub fn provider_kind(&self) -> Result<ProviderKind, DigestError> {
        self.provider.parse()
    }

    /// Configured model, or the provider's default.
    pub fn effective_model(&self, kind: ProviderKind) -> String {
        self.model_name
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    /// Explicit API key, falling back to the provider's environment variable.
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| kind.api_key_env().and_then(|var| std::env::var(var).ok()))
            .filter(|k| !k.trim().is_empty())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Summary backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Token budget per chunk (chunks stay strictly below it)
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,

    /// Behaviour on backend failure
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Where `process` writes the pipeline state
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_chunk_budget() -> usize {
    30000
}

fn default_state_path() -> String {
    "conversation_state.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            chunk_budget: default_chunk_budget(),
            failure_policy: FailurePolicy::default(),
            state_path: default_state_path(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/convo-digest/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (DIGEST_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, DigestError> {
        let config_dir = ProjectDirs::from("", "", "convo-digest")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("backend.provider", default_provider())
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("backend.max_tokens", default_max_tokens() as i64)
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("backend.timeout_secs", default_timeout_secs() as i64)
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("backend.max_attempts", default_max_attempts() as i64)
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("chunk_budget", default_chunk_budget() as i64)
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("state_path", default_state_path())
            .map_err(|e| DigestError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| DigestError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DIGEST_CHUNK_BUDGET, DIGEST_BACKEND__PROVIDER, DIGEST_BACKEND__MODEL_NAME, ...
        builder = builder.add_source(
            Environment::with_prefix("DIGEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| DigestError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| DigestError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), DigestError> {
        if self.chunk_budget == 0 {
            return Err(DigestError::Config(
                "chunk_budget must be > 0".to_string(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(DigestError::Config(
                "backend.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.backend.max_attempts == 0 {
            return Err(DigestError::Config(
                "backend.max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
