use crate::{ChatMessage, RagError};
use async_trait::async_trait;

#[async_trait]
pub trait Embeddings {
    /// One vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

#[async_trait]
pub trait ChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError>;
}
