use crate::models::{ChatMessage, PipelineOptions};
use crate::traits::{ChatModel, Embeddings};
use crate::RagError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const MISSING_CREDENTIAL: &str = "no OpenAI API key configured (set OPENAI_API_KEY or pass --api-key)";

/// An API key. Blank input is treated as no key at all.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV).ok().and_then(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for the OpenAI-compatible `/embeddings` and `/chat/completions`
/// endpoints. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: Url,
    credential: Option<Credential>,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    batch_size: usize,
}

impl OpenAiClient {
    pub fn new(credential: Option<Credential>, options: &PipelineOptions) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|error| RagError::InvalidConfig(format!("http client: {error}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url(&options.base_url)?,
            credential,
            chat_model: options.chat_model.clone(),
            embedding_model: options.embedding_model.clone(),
            temperature: options.temperature,
            batch_size: options.embedding_batch_size.max(1),
        })
    }

    async fn embed_batch(&self, credential: &Credential, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = self.base_url.join("embeddings")?;
        debug!(inputs = batch.len(), model = %self.embedding_model, "requesting embeddings");

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.expose())
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                input: batch,
            })
            .send()
            .await
            .map_err(|error| RagError::Embedding(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(describe_failure(status, &body)));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| RagError::Embedding(format!("invalid embeddings response: {error}")))?;

        vectors_in_input_order(payload, batch.len()).map_err(RagError::Embedding)
    }
}

#[async_trait]
impl Embeddings for OpenAiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| RagError::Embedding(MISSING_CREDENTIAL.to_string()))?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(credential, batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("no embedding returned for query".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| RagError::Generation(MISSING_CREDENTIAL.to_string()))?;
        let url = self.base_url.join("chat/completions")?;
        debug!(
            model = %self.chat_model,
            temperature = self.temperature,
            messages = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.expose())
            .json(&ChatRequest {
                model: &self.chat_model,
                temperature: self.temperature,
                messages,
            })
            .send()
            .await
            .map_err(|error| RagError::Generation(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(describe_failure(status, &body)));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| RagError::Generation(format!("invalid chat response: {error}")))?;

        first_choice_content(payload).map_err(RagError::Generation)
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn parse_base_url(raw: &str) -> Result<Url, RagError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidConfig("base url is empty".to_string()));
    }

    let mut url = Url::parse(trimmed)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn vectors_in_input_order(payload: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    let mut data = payload.data;
    if data.len() != expected {
        return Err(format!(
            "expected {expected} embeddings, received {}",
            data.len()
        ));
    }

    data.sort_by_key(|datum| datum.index);
    for (position, datum) in data.iter().enumerate() {
        if datum.index != position {
            return Err(format!(
                "unexpected embedding index {} at position {position}",
                datum.index
            ));
        }
        if datum.embedding.is_empty() {
            return Err("received an empty embedding vector".to_string());
        }
    }

    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

fn first_choice_content(payload: ChatResponse) -> Result<String, String> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| "chat response had no message content".to_string())
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return format!("{status}: {}", parsed.error.message);
    }

    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        let excerpt = body.chars().take(200).collect::<String>();
        format!("{status}: {excerpt}")
    }
}
