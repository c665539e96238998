//! Prompt assembly

use super::memory::MemoryEntry;

pub const NO_CONTEXT: &str = "No Context Provided.";
pub const NO_MEMORY: &str = "No prior memory.";

const INSTRUCTIONS: &str = "\
You are a helpful assistant. Answer the user's query using the retrieved context and the conversation so far.

Guidelines:
1. Pick out the points of the retrieved context that matter for the query.
2. Explain them in a natural, conversational tone.
3. Keep the answer structured and easy to follow.
4. Do not cite or mention the sources; the answer should stand on its own.
5. Stay relevant to the query and accurate to the context.";

/// Build the generation prompt
///
/// Sources are numbered from 1 in the order given (best first).
pub fn build_prompt<'a, M, S>(query: &str, memory: M, sources: S) -> String
where
    M: IntoIterator<Item = &'a MemoryEntry>,
    S: IntoIterator<Item = &'a str>,
{
    let memory: Vec<String> = memory
        .into_iter()
        .map(|e| format!("Query: {}\nResponse: {}", e.query, e.response))
        .collect();
    let context: Vec<String> = sources
        .into_iter()
        .enumerate()
        .map(|(i, text)| format!("Source {}:\n{}", i + 1, text))
        .collect();

    let memory = if memory.is_empty() {
        NO_MEMORY.to_string()
    } else {
        memory.join("\n\n")
    };
    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context.join("\n\n")
    };

    format!(
        "{}\n\n### Memory:\n{}\n\n### Retrieved Context:\n{}\n\n### User Query:\n{}\n\n### Response:\n",
        INSTRUCTIONS, memory, context, query
    )
}
