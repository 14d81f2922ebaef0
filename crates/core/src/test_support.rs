//! Fixtures shared by the unit tests: in-memory PDFs and scripted remote
//! clients.

use crate::error::RagError;
use crate::models::ChatMessage;
use crate::traits::{ChatModel, Embeddings};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// One Courier text line per entry; an empty entry becomes a page with no text.
pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        if !text.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream encodes"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("pdf serializes");
    bytes
}

/// Embeds text as keyword presence counts so "sky" questions land near
/// "sky" chunks.
#[derive(Clone, Default)]
pub(crate) struct KeywordEmbeddings {
    pub calls: Arc<AtomicUsize>,
}

const KEYWORDS: [&str; 6] = ["sky", "blue", "grass", "green", "sea", "salt"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut vector = KEYWORDS
        .iter()
        .map(|keyword| lowered.matches(keyword).count() as f32)
        .collect::<Vec<_>>();
    vector.push(1.0);
    vector
}

#[async_trait]
impl Embeddings for KeywordEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| keyword_vector(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_vector(text))
    }
}

#[derive(Clone, Default)]
pub(crate) struct FailingEmbeddings;

#[async_trait]
impl Embeddings for FailingEmbeddings {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::Embedding("401 Unauthorized: invalid api key".to_string()))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        Err(RagError::Embedding("401 Unauthorized: invalid api key".to_string()))
    }
}

/// Answers with a fixed string and remembers the last prompt it was sent.
#[derive(Clone)]
pub(crate) struct ScriptedChat {
    pub reply: Result<String, String>,
    pub last_prompt: Arc<Mutex<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            last_prompt: Arc::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            last_prompt: Arc::default(),
        }
    }

    pub fn last_prompt(&self) -> Vec<ChatMessage> {
        self.last_prompt.lock().expect("prompt lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError> {
        *self.last_prompt.lock().expect("prompt lock") = messages.to_vec();
        self.reply.clone().map_err(RagError::Generation)
    }
}

/// A local stand-in for the `/v1/embeddings` endpoint.
pub(crate) struct EmbeddingsServer {
    pub base_url: String,
    pub requests: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct EmbeddingsServerState {
    requests: Arc<AtomicUsize>,
    fail_on_request: Option<usize>,
}

/// Every input embeds as `[char count, 1.0]`, and the data array comes back
/// in reverse order. Request number `fail_on_request` (1-based) gets a 429.
pub(crate) async fn spawn_embeddings_server(fail_on_request: Option<usize>) -> EmbeddingsServer {
    let requests = Arc::new(AtomicUsize::new(0));
    let state = EmbeddingsServerState {
        requests: Arc::clone(&requests),
        fail_on_request,
    };
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock server binds");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    EmbeddingsServer {
        base_url: format!("http://{addr}/v1"),
        requests,
    }
}

async fn embeddings_handler(
    State(state): State<EmbeddingsServerState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request_number = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    if state.fail_on_request == Some(request_number) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": {"message": "Rate limit reached for requests", "type": "requests"}
            })),
        );
    }

    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let data = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, input)| {
            let length = input.as_str().map(|text| text.chars().count()).unwrap_or_default();
            json!({"object": "embedding", "index": index, "embedding": [length as f32, 1.0]})
        })
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(json!({"object": "list", "data": data, "model": body["model"]})),
    )
}
