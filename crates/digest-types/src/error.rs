//! Error types for convo-digest.

use thiserror::Error;

/// Unified error type for settings, chunking and state persistence.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
