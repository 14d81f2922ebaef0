//! The interaction layer: stages uploaded bytes on disk, runs the pipeline
//! against them and turns every failure into a displayable message.
//!
//! A staged file lives exactly as long as the request that created it.
//! [`StagedDocument`] removes its file when dropped, so cleanup also happens
//! on early returns, panics and cancelled futures.

use crate::models::PipelineOptions;
use crate::openai::{Credential, OpenAiClient};
use crate::pipeline::RagPipeline;
use crate::traits::{ChatModel, Embeddings};
use crate::RagError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const STAGED_FILE_PREFIX: &str = "temp_uploaded";

/// Handle to one uploaded PDF on disk.
#[derive(Debug)]
pub struct StagedDocument {
    path: PathBuf,
    removed: bool,
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file now and reports a failure instead of only logging it.
    pub fn remove(mut self) -> Result<(), RagError> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(error) = remove_if_present(&self.path) {
            warn!(path = %self.path.display(), %error, "failed to remove staged pdf");
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), RagError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "staged pdf removed");
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(RagError::Io(error)),
    }
}

pub fn render_error(error: &RagError) -> String {
    format!("An error occurred: {error}")
}

pub struct InteractionShell<E, C>
where
    E: Embeddings,
    C: ChatModel,
{
    staging_dir: PathBuf,
    embedder: E,
    chat: C,
    options: PipelineOptions,
}

impl InteractionShell<OpenAiClient, OpenAiClient> {
    /// `credential` is whatever the caller obtained: typed by the user or
    /// read through [`Credential::from_env`].
    pub fn openai(
        staging_dir: impl Into<PathBuf>,
        credential: Option<Credential>,
        options: PipelineOptions,
    ) -> Result<Self, RagError> {
        let client = OpenAiClient::new(credential, &options)?;
        Ok(Self::new(staging_dir, client.clone(), client, options))
    }
}

impl<E, C> InteractionShell<E, C>
where
    E: Embeddings + Clone + Send + Sync,
    C: ChatModel + Clone + Send + Sync,
{
    pub fn new(staging_dir: impl Into<PathBuf>, embedder: E, chat: C, options: PipelineOptions) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            embedder,
            chat,
            options,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Writes the uploaded bytes to a fresh, uniquely named file.
    pub fn submit_document(&self, bytes: &[u8]) -> Result<StagedDocument, RagError> {
        let path = self
            .staging_dir
            .join(format!("{STAGED_FILE_PREFIX}-{}.pdf", Uuid::new_v4()));

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let document = StagedDocument {
            path,
            removed: false,
        };
        file.write_all(bytes)?;
        file.sync_all()?;

        debug!(path = %document.path.display(), bytes = bytes.len(), "pdf staged");
        Ok(document)
    }

    /// Answers one question about the staged document, or describes why it
    /// could not. The staged file is gone when this returns.
    pub async fn ask(&self, document: StagedDocument, question: &str) -> String {
        match self.try_ask(document, question).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, retryable = error.is_retryable(), "question failed");
                render_error(&error)
            }
        }
    }

    pub async fn try_ask(&self, document: StagedDocument, question: &str) -> Result<String, RagError> {
        let outcome = match self.build_pipeline(&document).await {
            Ok(pipeline) => pipeline.query(question).await,
            Err(error) => Err(error),
        };
        let cleanup = document.remove();

        let answer = outcome?;
        cleanup?;
        Ok(answer)
    }

    /// Indexes the staged document and releases the file straight away, for
    /// callers that want to ask several questions about one upload.
    pub async fn open_session(&self, document: StagedDocument) -> Result<RagPipeline<E, C>, RagError> {
        let built = self.build_pipeline(&document).await;
        let cleanup = document.remove();

        let pipeline = built?;
        cleanup?;
        info!(chunks = pipeline.chunk_count(), "session ready");
        Ok(pipeline)
    }

    async fn build_pipeline(&self, document: &StagedDocument) -> Result<RagPipeline<E, C>, RagError> {
        RagPipeline::build(
            document.path(),
            self.embedder.clone(),
            self.chat.clone(),
            self.options.clone(),
        )
        .await
    }
}
