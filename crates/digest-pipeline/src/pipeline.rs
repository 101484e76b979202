//! Two-level summarization of a conversation transcript.
//!
//! A run chunks the transcript, summarizes each chunk in order, then asks
//! the backend to synthesize all chunk summaries into one meta-summary with
//! a progress-points section:
//!
//! `Idle -> Chunking -> SummarizingChunks(1..=N) -> MetaSummarizing -> Done`
//!
//! Backend calls are made one at a time. A pipeline runs once; build a new
//! one for every transcript.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use digest_types::{FailurePolicy, PipelineState, RestoredSession, Settings};

use crate::backend::{build_backend, error_marker, BackendError, SummaryBackend};
use crate::chunker::Chunker;
use crate::error::PipelineError;
use crate::prompts::{chunk_prompt, meta_prompt, CHUNK_INSTRUCTION, META_INSTRUCTION};
use crate::tokens::{counter_for, TokenCounter};

/// Default token budget per chunk.
pub const DEFAULT_CHUNK_BUDGET: usize = 30000;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunks stay strictly below this many tokens
    pub chunk_budget: usize,
    /// What to do when a backend call fails
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_budget: settings.chunk_budget,
            failure_policy: settings.failure_policy,
        }
    }
}

/// Where a pipeline is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Chunking,
    /// Summarizing chunk `current` (1-based) of `total`
    SummarizingChunks { current: usize, total: usize },
    MetaSummarizing,
    Done,
    /// Stopped by a backend failure under the abort policy
    Failed,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Meta-summary text, or an error marker if that call failed
    pub meta_summary: String,
    /// Number of chunks the transcript was split into
    pub chunk_count: usize,
    /// 1-based numbers of chunks whose summary is an error marker
    pub failed_chunks: Vec<usize>,
    /// Whether the meta-summary itself is an error marker
    pub meta_failed: bool,
}

impl RunReport {
    /// Whether any backend call of the run failed.
    pub fn is_degraded(&self) -> bool {
        self.meta_failed || !self.failed_chunks.is_empty()
    }
}

/// Chunk, summarize, and synthesize one transcript.
pub struct ConversationPipeline {
    backend: Arc<dyn SummaryBackend>,
    chunker: Chunker,
    config: PipelineConfig,
    state: PipelineState,
    stage: PipelineStage,
}

impl ConversationPipeline {
    /// Create a pipeline from explicit parts.
    pub fn new(
        backend: Arc<dyn SummaryBackend>,
        counter: Arc<dyn TokenCounter>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let chunker = Chunker::new(config.chunk_budget, counter)?;
        Ok(Self {
            backend,
            chunker,
            config,
            state: PipelineState::new(),
            stage: PipelineStage::Idle,
        })
    }

    /// Create the pipeline selected by `settings`.
    ///
    /// The provider picks both the backend and the token counting policy.
    /// Unknown providers, a zero budget and missing credentials fail here.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        settings.validate()?;

        let kind = settings.backend.provider_kind()?;
        let model = settings.backend.effective_model(kind);
        let counter = counter_for(kind, &model)?;
        let backend = build_backend(&settings.backend)?;

        info!(
            provider = %kind,
            model = %model,
            chunk_budget = settings.chunk_budget,
            failure_policy = ?settings.failure_policy,
            "Pipeline configured"
        );

        Self::new(backend, counter, PipelineConfig::from_settings(settings))
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Summarize `transcript` and return the meta-summary.
    pub async fn run(&mut self, transcript: &str) -> Result<String, PipelineError> {
        Ok(self.run_with_report(transcript).await?.meta_summary)
    }

    /// Summarize `transcript` and report which calls degraded.
    ///
    /// Under [`FailurePolicy::Continue`] failed calls become error markers
    /// and the run completes. Under [`FailurePolicy::Abort`] the first
    /// failure ends the run.
    pub async fn run_with_report(&mut self, transcript: &str) -> Result<RunReport, PipelineError> {
        if self.stage != PipelineStage::Idle {
            return Err(PipelineError::AlreadyRun);
        }

        self.stage = PipelineStage::Chunking;
        info!(
            chars = transcript.len(),
            backend = self.backend.name(),
            "Starting conversation processing"
        );

        let chunks = self.chunker.split(transcript);
        let total = chunks.len();
        info!(
            chunks = total,
            budget = self.chunker.budget(),
            "Split conversation into chunks"
        );

        if chunks.is_empty() {
            self.stage = PipelineStage::Done;
            return Ok(RunReport {
                meta_summary: String::new(),
                chunk_count: 0,
                failed_chunks: Vec::new(),
                meta_failed: false,
            });
        }

        let mut run_summaries = Vec::with_capacity(total);
        let mut failed_chunks = Vec::new();

        for chunk in &chunks {
            let number = chunk.index() + 1;
            self.stage = PipelineStage::SummarizingChunks {
                current: number,
                total,
            };
            info!("Processing chunk {}/{}", number, total);
            debug!(
                chunk = number,
                tokens = chunk.token_count(),
                chars = chunk.text().len(),
                "Summarizing chunk"
            );

            let outcome = self
                .backend
                .generate(CHUNK_INSTRUCTION, &chunk_prompt(chunk.text()))
                .await;

            let summary = match outcome {
                Ok(summary) => summary,
                Err(e) => {
                    let marker = self.degrade(e, |source| PipelineError::ChunkFailed {
                        chunk: number,
                        source,
                    })?;
                    warn!(chunk = number, "Chunk summary replaced by error marker");
                    failed_chunks.push(number);
                    marker
                }
            };

            self.state.push_summary(summary.clone());
            run_summaries.push(summary);
        }

        self.stage = PipelineStage::MetaSummarizing;
        info!(summaries = run_summaries.len(), "Creating final meta-summary");

        let outcome = self
            .backend
            .generate(META_INSTRUCTION, &meta_prompt(&run_summaries))
            .await;

        let (meta_summary, meta_failed) = match outcome {
            Ok(text) => (text, false),
            Err(e) => {
                let marker = self.degrade(e, PipelineError::MetaFailed)?;
                warn!("Meta-summary replaced by error marker");
                (marker, true)
            }
        };

        self.stage = PipelineStage::Done;
        info!(
            chunks = total,
            failed_chunks = failed_chunks.len(),
            meta_failed,
            "Conversation processing complete"
        );

        Ok(RunReport {
            meta_summary,
            chunk_count: total,
            failed_chunks,
            meta_failed,
        })
    }

    /// Apply the failure policy to a failed backend call.
    fn degrade(
        &mut self,
        err: BackendError,
        on_abort: impl FnOnce(BackendError) -> PipelineError,
    ) -> Result<String, PipelineError> {
        match self.config.failure_policy {
            FailurePolicy::Continue => {
                warn!(error = %err, "Backend call failed, continuing");
                Ok(error_marker(&err))
            }
            FailurePolicy::Abort => {
                self.stage = PipelineStage::Failed;
                Err(on_abort(err))
            }
        }
    }

    /// Save the pipeline state to `path`, overwriting it.
    pub fn persist(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        self.state.save(path)?;
        Ok(())
    }

    /// Replace the pipeline state with the one saved at `path`.
    ///
    /// On failure the current state is left untouched. A restored cursor
    /// does not make the next run skip chunks.
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<RestoredSession, PipelineError> {
        let path = path.as_ref();
        let (state, session) = PipelineState::load(path)?;

        info!(
            path = %path.display(),
            summaries = state.len(),
            cursor = state.cursor(),
            last_updated = session.raw_last_updated.as_deref().unwrap_or("unknown"),
            "Restored previous session"
        );

        self.state = state;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{is_error_marker, MockBackend};
    use crate::tokens::ApproxCounter;

    const TWO_CHUNK_TEXT: &str = "Hello world. This is a test! Done?";

    fn pipeline_with(
        backend: Arc<MockBackend>,
        budget: usize,
        failure_policy: FailurePolicy,
    ) -> ConversationPipeline {
        ConversationPipeline::new(
            backend,
            Arc::new(ApproxCounter),
            PipelineConfig {
                chunk_budget: budget,
                failure_policy,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_transcript_makes_no_calls() {
        let backend = Arc::new(MockBackend::new());
        let mut pipeline = pipeline_with(backend.clone(), 100, FailurePolicy::Continue);

        let report = pipeline.run_with_report("   ").await.unwrap();
        assert_eq!(report.meta_summary, "");
        assert_eq!(report.chunk_count, 0);
        assert_eq!(backend.call_count(), 0);
        assert!(pipeline.state().is_empty());
        assert_eq!(pipeline.stage(), PipelineStage::Done);
    }

    #[tokio::test]
    async fn test_single_chunk_run() {
        let backend = Arc::new(MockBackend::with_responses(["chunk summary", "final"]));
        let mut pipeline = pipeline_with(backend.clone(), 30000, FailurePolicy::Continue);

        let meta = pipeline.run(TWO_CHUNK_TEXT).await.unwrap();
        assert_eq!(meta, "final");

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].instruction, CHUNK_INSTRUCTION);
        assert_eq!(calls[0].text, chunk_prompt(TWO_CHUNK_TEXT));
        assert_eq!(calls[1].instruction, META_INSTRUCTION);
        assert!(calls[1].text.ends_with("Summary 1: chunk summary"));
        assert_eq!(pipeline.state().summaries(), &["chunk summary"]);
    }

    #[tokio::test]
    async fn test_meta_input_is_labeled_in_order() {
        let backend = Arc::new(MockBackend::with_responses(["S1", "S2", "META"]));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Continue);

        let meta = pipeline.run(TWO_CHUNK_TEXT).await.unwrap();
        assert_eq!(meta, "META");
        assert_eq!(pipeline.state().summaries(), &["S1", "S2"]);

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        let meta_input = &calls[2].text;
        let first = meta_input.find("Summary 1: S1").unwrap();
        let second = meta_input.find("Summary 2: S2").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_duplicate_summaries_are_kept() {
        let backend = Arc::new(MockBackend::with_responses(["same", "same", "META"]));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Continue);

        pipeline.run(TWO_CHUNK_TEXT).await.unwrap();
        assert_eq!(pipeline.state().summaries(), &["same", "same"]);
        assert!(backend.calls()[2].text.contains("Summary 2: same"));
    }

    #[tokio::test]
    async fn test_always_failing_backend_completes() {
        let backend = Arc::new(MockBackend::failing("network unreachable"));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Continue);

        let report = pipeline.run_with_report(TWO_CHUNK_TEXT).await.unwrap();
        assert!(report.meta_summary.contains("Error in summarization"));
        assert!(report.meta_summary.contains("network unreachable"));
        assert_eq!(report.failed_chunks, vec![1, 2]);
        assert!(report.meta_failed);
        assert!(report.is_degraded());

        assert!(pipeline.state().summaries().iter().all(|s| is_error_marker(s)));
        // Markers flow into the meta-summary input.
        assert!(backend.calls()[2].text.contains("Summary 1: Error in summarization"));
        assert_eq!(pipeline.stage(), PipelineStage::Done);
    }

    #[tokio::test]
    async fn test_one_failed_chunk_does_not_stop_run() {
        let backend = Arc::new(MockBackend::new().fail_on_calls(&[2]));
        let mut pipeline = pipeline_with(backend.clone(), 4, FailurePolicy::Continue);

        let report = pipeline.run_with_report(TWO_CHUNK_TEXT).await.unwrap();
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.failed_chunks, vec![2]);
        assert!(!report.meta_failed);

        let summaries = pipeline.state().summaries();
        assert_eq!(summaries.len(), 3);
        assert!(!is_error_marker(&summaries[0]));
        assert!(is_error_marker(&summaries[1]));
        assert!(!is_error_marker(&summaries[2]));
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let backend = Arc::new(MockBackend::failing("quota exceeded"));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Abort);

        let err = pipeline.run(TWO_CHUNK_TEXT).await.unwrap_err();
        assert!(matches!(err, PipelineError::ChunkFailed { chunk: 1, .. }));
        assert_eq!(backend.call_count(), 1);
        assert!(pipeline.state().is_empty());
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
    }

    #[tokio::test]
    async fn test_abort_policy_on_meta_failure() {
        let backend = Arc::new(MockBackend::new().fail_on_calls(&[3]));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Abort);

        let err = pipeline.run(TWO_CHUNK_TEXT).await.unwrap_err();
        assert!(matches!(err, PipelineError::MetaFailed(_)));
        assert_eq!(pipeline.state().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_rejected() {
        let backend = Arc::new(MockBackend::new());
        let mut pipeline = pipeline_with(backend, 100, FailurePolicy::Continue);

        pipeline.run("One. Two.").await.unwrap();
        assert!(matches!(
            pipeline.run("Three.").await,
            Err(PipelineError::AlreadyRun)
        ));
        assert_eq!(pipeline.state().len(), 1);
    }

    #[test]
    fn test_zero_budget_is_config_error() {
        let result = ConversationPipeline::new(
            Arc::new(MockBackend::new()),
            Arc::new(ApproxCounter),
            PipelineConfig {
                chunk_budget: 0,
                failure_policy: FailurePolicy::Continue,
            },
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_from_settings_mock_provider() {
        let settings = Settings {
            backend: digest_types::BackendSettings::mock(),
            chunk_budget: 500,
            ..Settings::default()
        };
        let pipeline = ConversationPipeline::from_settings(&settings).unwrap();
        assert_eq!(pipeline.chunker().budget(), 500);
        assert_eq!(pipeline.stage(), PipelineStage::Idle);
    }

    #[test]
    fn test_from_settings_rejects_unknown_provider() {
        let mut settings = Settings::default();
        settings.backend.provider = "palm".to_string();
        assert!(matches!(
            ConversationPipeline::from_settings(&settings),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_from_settings_rejects_zero_budget() {
        let settings = Settings {
            backend: digest_types::BackendSettings::mock(),
            chunk_budget: 0,
            ..Settings::default()
        };
        assert!(matches!(
            ConversationPipeline::from_settings(&settings),
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let backend = Arc::new(MockBackend::with_responses(["S1", "S2", "META"]));
        let mut pipeline = pipeline_with(backend, 8, FailurePolicy::Continue);
        pipeline.run(TWO_CHUNK_TEXT).await.unwrap();
        pipeline.persist(&path).unwrap();

        let mut fresh = pipeline_with(Arc::new(MockBackend::new()), 8, FailurePolicy::Continue);
        let session = fresh.restore(&path).unwrap();
        assert_eq!(fresh.state().summaries(), pipeline.state().summaries());
        assert_eq!(fresh.state().cursor(), pipeline.state().cursor());
        assert_eq!(session.last_summary.as_deref(), Some("S2"));
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"summaries\": [").unwrap();

        let backend = Arc::new(MockBackend::with_responses(["kept", "META"]));
        let mut pipeline = pipeline_with(backend, 100, FailurePolicy::Continue);
        pipeline.run("Only one sentence.").await.unwrap();

        assert!(matches!(
            pipeline.restore(&path),
            Err(PipelineError::State(_))
        ));
        assert_eq!(pipeline.state().summaries(), &["kept"]);
    }

    #[tokio::test]
    async fn test_restored_cursor_does_not_skip_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"summaries": ["old"], "current_position": 1}"#,
        )
        .unwrap();

        let backend = Arc::new(MockBackend::with_responses(["S1", "S2", "META"]));
        let mut pipeline = pipeline_with(backend.clone(), 8, FailurePolicy::Continue);
        pipeline.restore(&path).unwrap();
        pipeline.run(TWO_CHUNK_TEXT).await.unwrap();

        assert_eq!(backend.call_count(), 3);
        assert_eq!(pipeline.state().summaries(), &["old", "S1", "S2"]);
        assert_eq!(pipeline.state().cursor(), 1);
        // Only this run's summaries feed the meta-summary.
        assert!(!backend.calls()[2].text.contains("old"));
    }
}
