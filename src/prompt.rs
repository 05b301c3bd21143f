//! Prompt construction for grounded answers.

use crate::models::RetrievedChunk;

const INSTRUCTIONS: &str = "\
You are an expert assistant that answers questions using only the information in the context below.
Provide only the final answer to the user, in plain prose.
Remain factual and concise. Do not guess and do not add outside knowledge.
Do not use bullet points and do not add citation markers or source references; sources are listed separately.
If the answer is not explicitly stated in the context, say \"I don't know based on the documents provided.\"";

/// Renders the user message sent to the model.
///
/// Pure: the same context and question always give the same prompt.
pub fn build_prompt(context: &[RetrievedChunk], question: &str) -> String {
    let context_block = context
        .iter()
        .map(|chunk| format!("[Source: {}]\n{}", chunk.source, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nContext:\n{}\n\nUser question: {}\n\nAnswer:",
        INSTRUCTIONS, context_block, question
    )
}
