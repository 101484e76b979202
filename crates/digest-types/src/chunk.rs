//! Transcript chunk type.

use serde::{Deserialize, Serialize};

/// A contiguous, sentence-aligned slice of a transcript.
///
/// Chunks are produced by the chunker in transcript order and are not
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    index: usize,
    text: String,
    token_count: usize,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(index: usize, text: String, token_count: usize) -> Self {
        Self {
            index,
            text,
            token_count,
        }
    }

    /// 0-based position of this chunk in the transcript.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Chunk text, trimmed, with sentence separators restored.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sum of the token counts of the units in this chunk.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Whether this chunk reaches the given budget.
    ///
    /// Only a chunk made of a single unsplittable unit can do so.
    pub fn is_oversized(&self, budget: usize) -> bool {
        self.token_count >= budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_accessors() {
        let chunk = Chunk::new(2, "Hello world.".to_string(), 3);
        assert_eq!(chunk.index(), 2);
        assert_eq!(chunk.text(), "Hello world.");
        assert_eq!(chunk.token_count(), 3);
        assert!(!chunk.is_oversized(4));
        assert!(chunk.is_oversized(3));
    }
}
