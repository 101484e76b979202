//! Chunking and hierarchical summarization for conversation transcripts.
//!
//! Provides:
//! - Token counting (exact tiktoken or approximate)
//! - Sentence-aligned chunking under a token budget
//! - Pluggable summary backends
//! - The two-level summarize-then-synthesize pipeline

pub mod backend;
pub mod chunker;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod tokens;

pub use backend::{build_backend, ApiBackend, ApiBackendConfig, BackendError, MockBackend, SummaryBackend};
pub use chunker::{split_into_chunks, ChunkBuilder, Chunker, Sentences};
pub use error::PipelineError;
pub use pipeline::{ConversationPipeline, PipelineConfig, PipelineStage, RunReport};
pub use tokens::{counter_for, ApproxCounter, CountingMode, TiktokenCounter, TokenCounter};
