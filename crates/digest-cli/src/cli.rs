//! CLI argument parsing for convo-digest.
//!
//! CLI flags override all other config sources.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Conversation digest
///
/// Summarizes a long conversation transcript into one meta-summary with
/// progress points.
#[derive(Parser, Debug)]
#[command(name = "convo-digest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/convo-digest/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Digest commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a transcript file and save summary and state
    Process(ProcessArgs),

    /// Show how a transcript would be chunked, without calling a backend
    Chunk(ChunkArgs),

    /// Print what a saved state file says about the previous session
    ShowState {
        /// State file to read
        path: PathBuf,
    },
}

/// Backend and budget overrides shared by commands
#[derive(Args, Debug, Clone, Default)]
pub struct BackendOverrides {
    /// Override provider (openai, gemini, anthropic, mock)
    #[arg(long)]
    pub provider: Option<String>,

    /// Override model name
    #[arg(long)]
    pub model: Option<String>,

    /// Override token budget per chunk
    #[arg(long)]
    pub chunk_budget: Option<usize>,
}

/// Arguments for `process`
#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Transcript text file
    pub input: PathBuf,

    /// Where to write the pipeline state (default from config)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Where to write the meta-summary (default: <state>_summary.txt)
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Stop at the first failed backend call instead of recording an error marker
    #[arg(long)]
    pub fail_fast: bool,

    #[command(flatten)]
    pub overrides: BackendOverrides,
}

/// Arguments for `chunk`
#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    /// Transcript text file
    pub input: PathBuf,

    #[command(flatten)]
    pub overrides: BackendOverrides,
}
