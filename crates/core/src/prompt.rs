//! "Stuff" prompting: every retrieved chunk goes verbatim into one system
//! message, the question goes into the user message.

use crate::models::{ChatMessage, RetrievedChunk};

const STUFF_SYSTEM_TEMPLATE: &str = concat!(
    "Use the following pieces of context to answer the user's question. \n",
    "If you don't know the answer, just say that you don't know, don't try to make up an answer.\n",
    "----------------\n",
    "{context}"
);

const CONTEXT_SEPARATOR: &str = "\n\n";

pub fn stuff_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_stuffed_messages(retrieved: &[RetrievedChunk], question: &str) -> Vec<ChatMessage> {
    let system = STUFF_SYSTEM_TEMPLATE.replace("{context}", &stuff_context(retrieved));
    vec![ChatMessage::system(system), ChatMessage::user(question)]
}
