//! Command implementations for convo-digest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use digest_pipeline::{counter_for, Chunker, ConversationPipeline, RunReport, TokenCounter};
use digest_types::{FailurePolicy, PipelineState, Settings};

use crate::cli::{BackendOverrides, ChunkArgs, ProcessArgs};

/// Files written by a `process` run.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub report: RunReport,
    pub state_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Derive the summary file from the state file: `x.json` -> `x_summary.txt`.
pub fn summary_path_for(state_path: &Path) -> PathBuf {
    let raw = state_path.to_string_lossy();
    match raw.strip_suffix(".json") {
        Some(stem) => PathBuf::from(format!("{stem}_summary.txt")),
        None => PathBuf::from(format!("{raw}_summary.txt")),
    }
}

fn load_settings(config_path: Option<&str>, overrides: &BackendOverrides) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut settings, overrides);
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, overrides: &BackendOverrides) {
    if let Some(provider) = &overrides.provider {
        settings.backend.provider = provider.clone();
    }
    if let Some(model) = &overrides.model {
        settings.backend.model_name = Some(model.clone());
    }
    if let Some(budget) = overrides.chunk_budget {
        settings.chunk_budget = budget;
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn read_transcript(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))
}

/// Run the pipeline on one transcript and write its state and summary.
pub async fn run_process(mut settings: Settings, args: &ProcessArgs) -> Result<ProcessOutcome> {
    if args.fail_fast {
        settings.failure_policy = FailurePolicy::Abort;
    }

    let transcript = read_transcript(&args.input)?;

    let mut pipeline =
        ConversationPipeline::from_settings(&settings).context("Failed to configure pipeline")?;

    let report = pipeline
        .run_with_report(&transcript)
        .await
        .context("Conversation processing failed")?;

    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.state_path));
    pipeline
        .persist(&state_path)
        .context("Failed to save pipeline state")?;

    let summary_path = args
        .summary
        .clone()
        .unwrap_or_else(|| summary_path_for(&state_path));
    std::fs::write(&summary_path, &report.meta_summary)
        .with_context(|| format!("Failed to write summary {}", summary_path.display()))?;

    if report.is_degraded() {
        warn!(
            failed_chunks = ?report.failed_chunks,
            meta_failed = report.meta_failed,
            "Some backend calls failed; their output was replaced by error markers"
        );
    }

    Ok(ProcessOutcome {
        report,
        state_path,
        summary_path,
    })
}

/// `process` command.
pub async fn handle_process(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    args: ProcessArgs,
) -> Result<()> {
    let mut settings = load_settings(config_path, &args.overrides)?;
    if let Some(level) = log_level_override {
        settings.log_level = level.to_string();
    }
    init_tracing(&settings.log_level)?;

    info!(input = %args.input.display(), "Processing transcript");
    let outcome = run_process(settings, &args).await?;

    println!(
        "Processing complete. Summary saved to {}",
        outcome.summary_path.display()
    );
    println!("State saved to {}", outcome.state_path.display());
    println!();
    println!("Final Summary:");
    println!("{}", outcome.report.meta_summary);

    Ok(())
}

/// `chunk` command: print the chunk plan for a transcript.
pub fn handle_chunk(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    args: ChunkArgs,
) -> Result<()> {
    let mut settings = load_settings(config_path, &args.overrides)?;
    if let Some(level) = log_level_override {
        settings.log_level = level.to_string();
    }
    init_tracing(&settings.log_level)?;

    let kind = settings
        .backend
        .provider_kind()
        .context("Invalid configuration")?;
    let model = settings.backend.effective_model(kind);
    let counter = counter_for(kind, &model).context("Failed to set up token counter")?;
    let chunker = Chunker::new(settings.chunk_budget, Arc::clone(&counter))
        .context("Invalid configuration")?;

    let transcript = read_transcript(&args.input)?;
    let chunks = chunker.split(&transcript);

    println!(
        "{} chunk(s) for {} ({} {} tokens, budget {})",
        chunks.len(),
        args.input.display(),
        counter.count(&transcript),
        format!("{:?}", counter.mode()).to_lowercase(),
        chunker.budget()
    );
    println!("{:<8} {:>10} {:>10}", "CHUNK", "TOKENS", "CHARS");
    for chunk in &chunks {
        let flag = if chunk.is_oversized(chunker.budget()) {
            " (oversized)"
        } else {
            ""
        };
        println!(
            "{:<8} {:>10} {:>10}{}",
            chunk.index() + 1,
            chunk.token_count(),
            chunk.text().chars().count(),
            flag
        );
    }

    Ok(())
}

/// `show-state` command: print the previous session recorded in a state file.
pub fn handle_show_state(log_level_override: Option<&str>, path: &Path) -> Result<()> {
    init_tracing(log_level_override.unwrap_or("warn"))?;

    let (state, session) = PipelineState::load(path)
        .with_context(|| format!("Failed to load state {}", path.display()))?;

    println!("Previous Session Information:");
    println!(
        "Last Updated: {}",
        session.raw_last_updated.as_deref().unwrap_or("Unknown")
    );
    println!("Summaries: {}", state.len());
    println!("Current Position: {}", state.cursor());
    if let Some(last) = session.last_summary.as_deref().or(state.last_summary()) {
        println!();
        println!("Last Progress Summary:");
        println!("{last}");
    }
    println!("{}", "-".repeat(50));

    Ok(())
}
