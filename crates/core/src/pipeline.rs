use crate::chunking::{build_chunks, RecursiveCharacterSplitter};
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::index::InMemoryIndex;
use crate::models::{DocumentFingerprint, PipelineOptions, RetrievedChunk};
use crate::openai::{Credential, OpenAiClient};
use crate::prompt::build_stuffed_messages;
use crate::traits::{ChatModel, Embeddings};
use crate::RagError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// A fully indexed document, ready to answer questions.
///
/// Construction reads, splits and embeds the whole PDF before returning; a
/// failure at any step returns the error and no pipeline exists. There is no
/// incremental re-indexing: a new document means a new pipeline.
pub struct RagPipeline<E, C>
where
    E: Embeddings,
    C: ChatModel,
{
    embedder: E,
    chat: C,
    index: InMemoryIndex,
    fingerprint: DocumentFingerprint,
    top_k: usize,
}

impl RagPipeline<OpenAiClient, OpenAiClient> {
    /// Builds a pipeline backed by the OpenAI API for both embeddings and
    /// chat completions.
    pub async fn open(
        path: &Path,
        credential: Option<Credential>,
        options: PipelineOptions,
    ) -> Result<Self, RagError> {
        let client = OpenAiClient::new(credential, &options)?;
        Self::build(path, client.clone(), client, options).await
    }
}

impl<E, C> RagPipeline<E, C>
where
    E: Embeddings + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub async fn build(path: &Path, embedder: E, chat: C, options: PipelineOptions) -> Result<Self, RagError> {
        Self::build_with_extractor(path, LopdfExtractor, embedder, chat, options).await
    }

    /// Hashing and PDF parsing run on the blocking pool; only the remote
    /// embedding calls run on the async executor.
    pub async fn build_with_extractor<X>(
        path: &Path,
        extractor: X,
        embedder: E,
        chat: C,
        options: PipelineOptions,
    ) -> Result<Self, RagError>
    where
        X: PdfExtractor + Send + 'static,
    {
        let owned = path.to_path_buf();
        let (checksum, pages) = tokio::task::spawn_blocking(move || {
            let checksum = digest_file(&owned).map_err(|error| {
                RagError::Load(format!("unable to read {}: {error}", owned.display()))
            })?;
            let pages = extractor.extract_pages(&owned)?;
            Ok::<_, RagError>((checksum, pages))
        })
        .await
        .map_err(|error| RagError::Load(format!("pdf loading task failed: {error}")))??;
        info!(path = %path.display(), pages = pages.len(), "pdf loaded");

        let fingerprint = DocumentFingerprint {
            document_id: checksum.clone(),
            source_path: path.to_string_lossy().to_string(),
            checksum,
            page_count: pages.len(),
            indexed_at: Utc::now(),
        };

        Self::from_pages(fingerprint, &pages, embedder, chat, options).await
    }

    /// Indexes already-extracted page text.
    pub async fn from_pages(
        mut fingerprint: DocumentFingerprint,
        pages: &[PageText],
        embedder: E,
        chat: C,
        options: PipelineOptions,
    ) -> Result<Self, RagError> {
        if options.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be at least 1".to_string()));
        }

        let splitter = RecursiveCharacterSplitter::from_options(&options)?;
        let chunks = build_chunks(&fingerprint.document_id, pages, &splitter);
        if chunks.is_empty() {
            return Err(RagError::Load(format!(
                "document has no readable text: {}",
                fingerprint.source_path
            )));
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        debug!(chunk_count = chunks.len(), "embedding chunks");
        let embeddings = embedder.embed_documents(&texts).await?;

        let mut index = InMemoryIndex::new(options.metric);
        index
            .insert_all(chunks, embeddings)
            .map_err(|error| RagError::Embedding(error.to_string()))?;

        fingerprint.indexed_at = index.built_at();
        info!(
            document_id = %fingerprint.document_id,
            chunk_count = index.len(),
            dimensions = index.dimensions().unwrap_or_default(),
            "document indexed"
        );

        Ok(Self {
            embedder,
            chat,
            index,
            fingerprint,
            top_k: options.top_k,
        })
    }

    /// The `top_k` chunks nearest to the question, closest first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidArgument("question is empty".to_string()));
        }

        let query_vector = self.embedder.embed_query(question).await?;
        self.index
            .nearest(&query_vector, self.top_k)
            .map_err(|error| RagError::Embedding(error.to_string()))
    }

    /// Answers one question from the retrieved chunks. The answer is not
    /// deterministic across calls.
    pub async fn query(&self, question: &str) -> Result<String, RagError> {
        let retrieved = self.retrieve(question).await?;
        debug!(
            retrieved = retrieved.len(),
            pages = ?retrieved.iter().map(|hit| hit.chunk.page).collect::<Vec<_>>(),
            "context retrieved"
        );

        let messages = build_stuffed_messages(&retrieved, question.trim());
        self.chat.complete(&messages).await
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn fingerprint(&self) -> &DocumentFingerprint {
        &self.fingerprint
    }
}

pub fn digest_file(path: &Path) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
