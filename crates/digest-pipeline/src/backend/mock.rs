//! Mock backend for testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BackendError, SummaryBackend};

/// One `generate` call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub instruction: String,
    pub text: String,
}

/// Mock backend that generates deterministic text.
///
/// Scripted responses are served first, in order; after that every call
/// gets a summary derived from its input. Failures can be injected for
/// every call or for specific 1-based call numbers. All calls are recorded.
pub struct MockBackend {
    responses: Mutex<VecDeque<String>>,
    fail_all: Option<String>,
    fail_calls: Vec<usize>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail_all: None,
            fail_calls: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `responses` to the first calls, in order.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        backend
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(responses.into_iter().map(Into::into));
        backend
    }

    /// Fail every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_all: Some(message.into()),
            ..Self::new()
        }
    }

    /// Fail the given 1-based call numbers.
    pub fn fail_on_calls(mut self, calls: &[usize]) -> Self {
        self.fail_calls = calls.to_vec();
        self
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryBackend for MockBackend {
    async fn generate(&self, instruction: &str, text: &str) -> Result<String, BackendError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            calls.push(RecordedCall {
                instruction: instruction.to_string(),
                text: text.to_string(),
            });
            calls.len()
        };

        if let Some(message) = &self.fail_all {
            return Err(BackendError::Api(message.clone()));
        }
        if self.fail_calls.contains(&call_number) {
            return Err(BackendError::Api(format!(
                "injected failure on call {call_number}"
            )));
        }

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(response) = scripted {
            return Ok(response);
        }

        // The payload follows the prompt header's blank line.
        let body = text.rsplit("\n\n").next().unwrap_or(text);
        Ok(format!(
            "Summary of {} chars: {}",
            body.chars().count(),
            truncate(body, 50)
        ))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Truncate text to max chars, adding "..." if truncated.
fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_deterministic_summary() {
        let backend = MockBackend::new();
        let a = backend.generate("i", "Header:\n\nHello world.").await.unwrap();
        let b = backend.generate("i", "Header:\n\nHello world.").await.unwrap();
        assert_eq!(a, "Summary of 12 chars: Hello world.");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_scripted_then_derived() {
        let backend = MockBackend::with_responses(["S1", "S2"]);
        assert_eq!(backend.generate("i", "one").await.unwrap(), "S1");
        assert_eq!(backend.generate("i", "two").await.unwrap(), "S2");
        assert!(backend
            .generate("i", "three")
            .await
            .unwrap()
            .starts_with("Summary of"));
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let backend = MockBackend::failing("quota exceeded");
        let err = backend.generate("i", "t").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fail_on_specific_call() {
        let backend = MockBackend::new().fail_on_calls(&[2]);
        assert!(backend.generate("i", "a").await.is_ok());
        assert!(backend.generate("i", "b").await.is_err());
        assert!(backend.generate("i", "c").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let backend = MockBackend::new();
        backend.generate("instr", "body").await.unwrap();
        let calls = backend.calls();
        assert_eq!(
            calls,
            vec![RecordedCall {
                instruction: "instr".to_string(),
                text: "body".to_string(),
            }]
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
