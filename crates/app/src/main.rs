use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    render_error, Credential, DistanceMetric, InteractionShell, OpenAiClient, PipelineOptions,
    RagError, RagPipeline, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Ask questions about a PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key; falls back to OPENAI_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Chat completion model
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Embedding model
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Number of chunks stuffed into the prompt
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Target chunk length in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Distance used to rank chunks
    #[arg(long, value_enum, default_value_t = Metric::L2)]
    metric: Metric,

    /// HTTP timeout per API request, in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Where uploads are staged; defaults to the system temp directory
    #[arg(long)]
    staging_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Index a PDF and answer a single question.
    Ask {
        /// PDF to upload.
        #[arg(long)]
        pdf: PathBuf,
        /// Question about the document.
        #[arg(long)]
        question: String,
        /// Print the retrieved chunks before the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Index a PDF once and answer questions read from stdin, one per line.
    Chat {
        /// PDF to upload.
        #[arg(long)]
        pdf: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    L2,
    Cosine,
}

impl From<Metric> for DistanceMetric {
    fn from(value: Metric) -> Self {
        match value {
            Metric::L2 => DistanceMetric::SquaredEuclidean,
            Metric::Cosine => DistanceMetric::Cosine,
        }
    }
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            metric: self.metric.into(),
            chat_model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.temperature,
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            ..PipelineOptions::default()
        }
    }

    /// A key typed on the command line wins over the environment.
    fn credential(&self) -> Option<Credential> {
        self.api_key
            .clone()
            .and_then(Credential::new)
            .or_else(Credential::from_env)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let credential = cli.credential();
    if credential.is_none() {
        warn!("no OpenAI API key configured; indexing will fail");
    }

    let staging_dir = cli.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
    let shell = InteractionShell::openai(staging_dir, credential, cli.pipeline_options())
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        staging_dir = %shell.staging_dir().display(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ask {
            pdf,
            question,
            show_context,
        } => {
            let bytes = read_upload(&pdf).await?;
            let document = shell.submit_document(&bytes)?;

            if show_context {
                match shell.open_session(document).await {
                    Ok(session) => answer_with_context(&session, &question).await,
                    Err(error) => report_failure(&error),
                }
            } else {
                match shell.try_ask(document, &question).await {
                    Ok(answer) => print_response(&answer),
                    Err(error) => report_failure(&error),
                }
            }
        }
        Command::Chat { pdf } => {
            let bytes = read_upload(&pdf).await?;
            let document = shell.submit_document(&bytes)?;

            let session = match shell.open_session(document).await {
                Ok(session) => session,
                Err(error) => {
                    report_failure(&error);
                    return Ok(());
                }
            };
            println!(
                "indexed {} chunks from {}; ask a question (empty line skips, `exit` quits)",
                session.chunk_count(),
                pdf.display()
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if question.eq_ignore_ascii_case("exit") {
                    break;
                }

                match session.query(question).await {
                    Ok(answer) => print_response(&answer),
                    Err(error) => report_failure(&error),
                }
            }
        }
    }

    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("unable to read {}", path.display()))
}

async fn answer_with_context(session: &RagPipeline<OpenAiClient, OpenAiClient>, question: &str) {
    match session.retrieve(question).await {
        Ok(hits) => {
            for hit in hits {
                println!(
                    "[page {}] distance={:.4} chunk={}",
                    hit.chunk.page, hit.distance, hit.chunk.chunk_index
                );
                println!("{}\n", hit.chunk.text);
            }
        }
        Err(error) => {
            report_failure(&error);
            return;
        }
    }

    match session.query(question).await {
        Ok(answer) => print_response(&answer),
        Err(error) => report_failure(&error),
    }
}

/// The details go to the log; stdout only gets the generic banner.
fn report_failure(error: &RagError) {
    warn!(%error, retryable = error.is_retryable(), "question failed");
    println!("{}", render_error(error));
}

fn print_response(answer: &str) {
    println!("### Response");
    println!("{answer}");
}
