//! Instructions and prompt layout for the two summarization passes.

/// Instruction for summarizing one chunk.
pub const CHUNK_INSTRUCTION: &str = "You are a helpful assistant that summarizes conversations. \
Create a concise summary that captures the main points and context of the conversation.";

/// Instruction for synthesizing the chunk summaries.
pub const META_INSTRUCTION: &str = "Create a comprehensive meta-summary that:
1. Combines and synthesizes multiple conversation summaries into a coherent narrative
2. Ends with a 'Progress Points' section that includes:
   - Key decisions or conclusions reached
   - Last discussed topics or events
   - Current status or next steps
Format the progress points as bullet points for clarity.";

/// Input text for summarizing one chunk.
pub fn chunk_prompt(chunk: &str) -> String {
    format!("Please summarize the following conversation chunk:\n\n{chunk}")
}

/// Label each summary with its 1-based position, separated by blank lines.
pub fn label_summaries(summaries: &[String]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Summary {}: {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Input text for the meta-summary pass.
pub fn meta_prompt(summaries: &[String]) -> String {
    format!(
        "Create a final summary that combines these summaries and includes progress points:\n\n{}",
        label_summaries(summaries)
    )
}
