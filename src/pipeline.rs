//! The query pipeline.
//!
//! [`RagPipeline`] owns read-only handles to the embedder, the index and the
//! chat model, built once per process and shared by every request. A query
//! runs retrieve → prompt → stream → drain → post-process, in order.
//!
//! [`RagPipeline::answer`] is the boundary used by the CLI and the server: it
//! never fails, every error becomes a message in the same channel as a
//! normal answer.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::answer::{collect_citations, ReasoningFilter, DOCUMENTS_PATH};
use crate::config::Config;
use crate::connector_fs;
use crate::embedding::{create_embedder, Embedder};
use crate::index::{SqliteIndex, VectorIndex};
use crate::llm::{drain, ChatModel, ChatRequest, LlmError, OpenAiChat};
use crate::models::Answer;
use crate::prompt::build_prompt;
use crate::retrieve::{RetrievalError, Retriever};

pub const EMPTY_INDEX_MESSAGE: &str =
    "No documents have been ingested yet. Add files to the documents directory and run `rag ingest`.";
pub const NO_MATCH_MESSAGE: &str = "No relevant documents found for your question.";
pub const UNEXPECTED_MESSAGE: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl QueryError {
    /// The text shown to the user in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::Retrieval(RetrievalError::EmptyIndex) => EMPTY_INDEX_MESSAGE.to_string(),
            QueryError::Retrieval(RetrievalError::NoMatch) => NO_MATCH_MESSAGE.to_string(),
            QueryError::Retrieval(RetrievalError::DimensionMismatch(m)) => format!(
                "The document index was built with a different embedding model \
                 ({} dimensions, the current model produces {}). Run `rag ingest` to rebuild it.",
                m.stored, m.query
            ),
            QueryError::Retrieval(RetrievalError::Embedding(e)) => {
                format!("Sorry, your question could not be embedded: {:#}", e)
            }
            QueryError::Retrieval(RetrievalError::Index(e)) => {
                format!("Sorry, the document index could not be searched: {:#}", e)
            }
            QueryError::Llm(LlmError::Connection { url, .. }) => format!(
                "Could not connect to the language model server at {}. Is it running?",
                url
            ),
            QueryError::Llm(LlmError::Timeout { secs }) => format!(
                "The language model did not respond within {} seconds. Please try again later.",
                secs
            ),
            QueryError::Llm(LlmError::Status { status, body }) => {
                let body = body.trim();
                if body.is_empty() {
                    format!("The language model server returned an error (HTTP {}).", status)
                } else {
                    format!(
                        "The language model server returned an error (HTTP {}): {}",
                        status, body
                    )
                }
            }
            QueryError::Llm(LlmError::Transport(detail)) => {
                format!("Error communicating with the language model: {}", detail)
            }
        }
    }
}

/// Per-request generation settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub reasoning_start: String,
    pub reasoning_end: String,
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.llm.system_prompt.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            reasoning_start: config.llm.reasoning_start.clone(),
            reasoning_end: config.llm.reasoning_end.clone(),
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
        }
    }
}

pub struct RagPipeline {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
    reasoning: Option<ReasoningFilter>,
    settings: PipelineSettings,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
        settings: PipelineSettings,
    ) -> Self {
        let retriever = Retriever::new(embedder, index, settings.top_k, settings.min_score);
        let reasoning = ReasoningFilter::new(&settings.reasoning_start, &settings.reasoning_end)
            .map_err(|e| {
                tracing::warn!(error = %e, "invalid reasoning markers, answers are returned unfiltered")
            })
            .ok();
        Self {
            retriever,
            chat,
            reasoning,
            settings,
        }
    }

    /// Runs one query end to end.
    ///
    /// A stream that fails before producing any text is reported as an
    /// error; one that fails later yields an [`Answer`] with `partial` set.
    pub async fn run(&self, query: &str) -> Result<Answer, QueryError> {
        let hits = self.retriever.retrieve(query).await?;

        let request = ChatRequest {
            system: self.settings.system_prompt.clone(),
            user: build_prompt(&hits, query),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let stream = self.chat.stream_chat(&request).await?;
        let drained = drain(stream).await;

        let partial = match drained.error {
            Some(e) if drained.text.is_empty() => return Err(e.into()),
            Some(e) => {
                tracing::warn!(error = %e, received = drained.text.len(), "model stream interrupted");
                Some(e.to_string())
            }
            None => None,
        };

        let text = match &self.reasoning {
            Some(filter) => filter.strip(&drained.text),
            None => drained.text.trim().to_string(),
        };

        Ok(Answer {
            text,
            citations: collect_citations(&hits, DOCUMENTS_PATH),
            partial,
        })
    }

    /// Builds the production pipeline: configured embedder, SQLite index and
    /// OpenAI-compatible chat client.
    ///
    /// Loading the embedding model happens here, so a missing or broken model
    /// fails at startup rather than on the first query. So does a missing
    /// documents directory, which citations are served from.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        connector_fs::ensure_root(&config.documents.root)?;
        if !config.embedding.is_enabled() {
            anyhow::bail!("Embeddings are disabled; set [embedding].provider to answer queries");
        }
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(&config.db.path).await?);
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.llm)?);
        tracing::info!(
            embedder = embedder.model_name(),
            llm = %config.llm.base_url,
            model = %config.llm.model,
            "query pipeline ready"
        );
        Ok(Self::new(embedder, index, chat, PipelineSettings::from_config(config)))
    }

    /// Runs one query and renders the outcome, whatever it is, as text.
    pub async fn answer(&self, query: &str) -> String {
        match AssertUnwindSafe(self.run(query)).catch_unwind().await {
            Ok(Ok(answer)) => answer.render(),
            Ok(Err(e)) => {
                match &e {
                    QueryError::Retrieval(RetrievalError::EmptyIndex)
                    | QueryError::Retrieval(RetrievalError::NoMatch) => {
                        tracing::info!(reason = %e, "no context for query")
                    }
                    _ => tracing::error!(error = %e, "query failed"),
                }
                e.user_message()
            }
            Err(_) => {
                tracing::error!("query pipeline panicked");
                UNEXPECTED_MESSAGE.to_string()
            }
        }
    }
}
