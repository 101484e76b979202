//! Transcript chunking under a token budget.
//!
//! The transcript is cut into sentence-like units right after every `. `,
//! `! ` and `? `. Units are packed greedily into chunks whose token count
//! stays strictly below the budget. A unit that alone reaches the budget
//! becomes a chunk of its own.
//!
//! Abbreviations, decimals and quoted punctuation are not special-cased.

use std::sync::Arc;

use tracing::{debug, trace};

use digest_types::{Chunk, DigestError};

use crate::tokens::TokenCounter;

/// Lazy iterator over the sentence-like units of a text.
///
/// Each unit keeps its terminator; the single space after it is dropped.
/// The last unit is whatever follows the final boundary and may be empty.
pub struct Sentences<'a> {
    rest: &'a str,
    done: bool,
}

impl<'a> Sentences<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            done: false,
        }
    }
}

impl<'a> Iterator for Sentences<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let bytes = self.rest.as_bytes();
        for i in 0..bytes.len().saturating_sub(1) {
            if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1] == b' ' {
                let unit = &self.rest[..=i];
                self.rest = &self.rest[i + 2..];
                return Some(unit);
            }
        }

        self.done = true;
        Some(self.rest)
    }
}

/// Builder that packs units into chunks.
///
/// Feed units in transcript order with [`ChunkBuilder::push_unit`] and
/// call [`ChunkBuilder::flush`] at end of input.
pub struct ChunkBuilder {
    budget: usize,
    counter: Arc<dyn TokenCounter>,

    /// Text of the chunk being built
    current_text: String,
    /// Token count of the chunk being built
    current_tokens: usize,
    /// Index the next emitted chunk will get
    next_index: usize,
}

impl ChunkBuilder {
    /// Create a builder. A zero budget is rejected.
    pub fn new(budget: usize, counter: Arc<dyn TokenCounter>) -> Result<Self, DigestError> {
        if budget == 0 {
            return Err(DigestError::Config(
                "chunk budget must be > 0".to_string(),
            ));
        }
        Ok(Self {
            budget,
            counter,
            current_text: String::new(),
            current_tokens: 0,
            next_index: 0,
        })
    }

    /// Add the next unit.
    ///
    /// Returns the previous chunk when this unit did not fit into it.
    pub fn push_unit(&mut self, unit: &str) -> Option<Chunk> {
        if unit.trim().is_empty() {
            return None;
        }

        let unit_tokens = self.counter.count(unit);
        trace!(tokens = unit_tokens, chars = unit.len(), "Processing unit");

        if self.current_tokens + unit_tokens < self.budget {
            self.append(unit, unit_tokens);
            return None;
        }

        debug!(
            current_tokens = self.current_tokens,
            unit_tokens,
            budget = self.budget,
            "Token budget boundary detected"
        );

        let closed = self.flush();
        self.append(unit, unit_tokens);
        closed
    }

    fn append(&mut self, unit: &str, unit_tokens: usize) {
        if !self.current_text.is_empty() {
            self.current_text.push(' ');
        }
        self.current_text.push_str(unit);
        self.current_tokens += unit_tokens;
    }

    /// Emit the chunk being built, if any.
    pub fn flush(&mut self) -> Option<Chunk> {
        let text = std::mem::take(&mut self.current_text);
        let tokens = std::mem::replace(&mut self.current_tokens, 0);

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let chunk = Chunk::new(self.next_index, trimmed.to_string(), tokens);
        self.next_index += 1;

        if chunk.is_oversized(self.budget) {
            debug!(
                index = chunk.index(),
                tokens,
                budget = self.budget,
                "Emitting oversized single-unit chunk"
            );
        }
        Some(chunk)
    }

    pub fn has_pending(&self) -> bool {
        !self.current_text.is_empty()
    }

    pub fn current_token_count(&self) -> usize {
        self.current_tokens
    }
}

/// Splits transcripts with a fixed budget and counter.
#[derive(Clone)]
pub struct Chunker {
    budget: usize,
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    /// Create a chunker. A zero budget is rejected.
    pub fn new(budget: usize, counter: Arc<dyn TokenCounter>) -> Result<Self, DigestError> {
        if budget == 0 {
            return Err(DigestError::Config(
                "chunk budget must be > 0".to_string(),
            ));
        }
        Ok(Self { budget, counter })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Split `text` into ordered chunks. Blank input gives no chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let mut builder = ChunkBuilder {
            budget: self.budget,
            counter: Arc::clone(&self.counter),
            current_text: String::new(),
            current_tokens: 0,
            next_index: 0,
        };
        let mut chunks = Vec::new();

        for unit in Sentences::new(text) {
            if let Some(chunk) = builder.push_unit(unit) {
                chunks.push(chunk);
            }
        }

        if let Some(chunk) = builder.flush() {
            chunks.push(chunk);
        }

        chunks
    }
}

/// Split `text` into chunks below `budget` tokens.
pub fn split_into_chunks(
    text: &str,
    budget: usize,
    counter: Arc<dyn TokenCounter>,
) -> Result<Vec<Chunk>, DigestError> {
    Ok(Chunker::new(budget, counter)?.split(text))
}
