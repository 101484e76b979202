//! convo-digest
//!
//! Summarizes long conversation transcripts chunk by chunk, then folds the
//! chunk summaries into one meta-summary with progress points.
//!
//! # Usage
//!
//! ```bash
//! convo-digest process transcript.txt [--state PATH] [--summary PATH]
//! convo-digest chunk transcript.txt [--chunk-budget N]
//! convo-digest show-state conversation_state.json
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/convo-digest/config.toml)
//! 3. Environment variables (DIGEST_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use digest_cli::{handle_chunk, handle_process, handle_show_state, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => {
            handle_process(cli.config.as_deref(), cli.log_level.as_deref(), args).await?;
        }
        Commands::Chunk(args) => {
            handle_chunk(cli.config.as_deref(), cli.log_level.as_deref(), args)?;
        }
        Commands::ShowState { path } => {
            handle_show_state(cli.log_level.as_deref(), &path)?;
        }
    }

    Ok(())
}
