pub mod chunking;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod shell;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{build_chunks, normalize_page_text, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use error::RagError;
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{cosine_similarity, InMemoryIndex};
pub use models::{
    ChatMessage, ChatRole, Chunk, DistanceMetric, DocumentFingerprint, PipelineOptions,
    RetrievedChunk, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
pub use openai::{Credential, OpenAiClient, API_KEY_ENV};
pub use pipeline::{digest_file, RagPipeline};
pub use prompt::{build_stuffed_messages, stuff_context};
pub use shell::{render_error, InteractionShell, StagedDocument, STAGED_FILE_PREFIX};
pub use traits::{ChatModel, Embeddings};
