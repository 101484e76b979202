//! Token counting for chunk budgets.
//!
//! Two policies: exact counting through a tiktoken BPE encoding, and a
//! character-ratio approximation for backends without a local tokenizer.
//! The policy is picked once per pipeline from the configured provider.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use digest_types::{DigestError, ProviderKind};

/// Characters per token for the approximate policy.
const CHARS_PER_TOKEN: usize = 4;

/// Which counting policy a counter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountingMode {
    Exact,
    Approximate,
}

/// Estimates how many model tokens a string consumes.
///
/// Counts need not be exact, but appending text must never lower the count.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn mode(&self) -> CountingMode;
}

/// Exact counter backed by a tiktoken encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Encoding for `model`, falling back to cl100k_base for unknown models.
    pub fn for_model(model: &str) -> Result<Self, DigestError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!(model, error = %e, "No tiktoken encoding for model, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| {
                    DigestError::Config(format!("Failed to load tokenizer: {e}"))
                })?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn mode(&self) -> CountingMode {
        CountingMode::Exact
    }
}

/// `ceil(chars / 4)` approximation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxCounter;

impl TokenCounter for ApproxCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    fn mode(&self) -> CountingMode {
        CountingMode::Approximate
    }
}

/// Pick the counting policy for a provider.
///
/// Only OpenAI models have a local tokenizer; every other provider is
/// approximated.
pub fn counter_for(
    kind: ProviderKind,
    model: &str,
) -> Result<Arc<dyn TokenCounter>, DigestError> {
    let counter: Arc<dyn TokenCounter> = match kind {
        ProviderKind::OpenAi => Arc::new(TiktokenCounter::for_model(model)?),
        ProviderKind::Gemini | ProviderKind::Anthropic | ProviderKind::Mock => {
            Arc::new(ApproxCounter)
        }
    };
    debug!(provider = %kind, model, mode = ?counter.mode(), "Selected token counter");
    Ok(counter)
}
