//! Error types for the summarization pipeline.

use thiserror::Error;

use digest_types::DigestError;

use crate::backend::BackendError;

/// Errors surfaced by [`crate::ConversationPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad settings; raised before any backend call
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chunk summary failed under the abort policy
    #[error("Summarizing chunk {chunk} failed: {source}")]
    ChunkFailed {
        /// 1-based chunk number
        chunk: usize,
        source: BackendError,
    },

    /// The meta-summary failed under the abort policy
    #[error("Meta-summary failed: {0}")]
    MetaFailed(BackendError),

    /// State file could not be read or written
    #[error("State error: {0}")]
    State(DigestError),

    /// `run` was called twice on one pipeline
    #[error("Pipeline already ran; create a new pipeline for each transcript")]
    AlreadyRun,
}

impl From<DigestError> for PipelineError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::Config(msg) => PipelineError::Config(msg),
            other => PipelineError::State(other),
        }
    }
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Config(msg) => PipelineError::Config(msg),
            other => PipelineError::MetaFailed(other),
        }
    }
}
