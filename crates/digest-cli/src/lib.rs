//! convo-digest CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (process, chunk, show-state)

pub mod cli;
pub mod commands;

pub use cli::{BackendOverrides, ChunkArgs, Cli, Commands, ProcessArgs};
pub use commands::{
    handle_chunk, handle_process, handle_show_state, run_process, summary_path_for, ProcessOutcome,
};
