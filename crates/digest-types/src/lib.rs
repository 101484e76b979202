//! Shared types for convo-digest.
//!
//! This crate provides:
//! - Transcript chunks
//! - Pipeline state and its JSON state file
//! - Layered settings
//! - Error types

pub mod chunk;
pub mod config;
pub mod error;
pub mod state;

pub use chunk::Chunk;
pub use config::{BackendSettings, FailurePolicy, ProviderKind, Settings};
pub use error::DigestError;
pub use state::{PipelineState, RestoredSession, StateFile};
