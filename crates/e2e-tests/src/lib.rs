//! End-to-end test infrastructure for convo-digest.
//!
//! Provides a shared TestHarness and helpers for driving the whole
//! chunk -> summarize -> synthesize -> persist flow.

use std::path::PathBuf;
use std::sync::Arc;

use digest_pipeline::{ApproxCounter, ConversationPipeline, MockBackend, PipelineConfig};
use digest_types::FailurePolicy;

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// State file location inside the temp dir
    pub state_path: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with a temp directory.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let state_path = temp_dir.path().join("conversation_state.json");
        Self {
            _temp_dir: temp_dir,
            state_path,
        }
    }

    /// Path for another file inside the harness directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join(name)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a transcript of `turns` alternating speaker lines.
///
/// Every turn ends with a terminator followed by a space, except the last.
pub fn create_transcript(turns: usize, topic: &str) -> String {
    let terminators = [".", "?", "!"];
    (0..turns)
        .map(|i| {
            let speaker = if i % 2 == 0 { "User" } else { "Assistant" };
            format!(
                "{speaker}: turn {i} about {topic} with detail {}{}",
                i * 31 % 97,
                terminators[i % terminators.len()]
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pipeline over a mock backend with approximate token counting.
pub fn mock_pipeline(
    backend: Arc<MockBackend>,
    chunk_budget: usize,
    failure_policy: FailurePolicy,
) -> ConversationPipeline {
    ConversationPipeline::new(
        backend,
        Arc::new(ApproxCounter),
        PipelineConfig {
            chunk_budget,
            failure_policy,
        },
    )
    .expect("Failed to build pipeline")
}
