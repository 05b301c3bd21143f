//! Query-side retrieval: embed the question and fetch the closest chunks.

use std::sync::Arc;
use thiserror::Error;

use crate::embedding::{EmbedRole, Embedder};
use crate::index::{DimensionMismatch, VectorIndex};
use crate::models::RetrievedChunk;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Nothing has been ingested.
    #[error("the document index is empty")]
    EmptyIndex,
    /// The index has records but none qualified for this question.
    #[error("no relevant documents matched the query")]
    NoMatch,
    /// The index was built with a different embedding model.
    #[error(transparent)]
    DimensionMismatch(DimensionMismatch),
    #[error("failed to embed query: {0}")]
    Embedding(anyhow::Error),
    #[error("failed to query index: {0}")]
    Index(anyhow::Error),
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            min_score,
        }
    }

    /// Returns at most `top_k` non-blank chunks ranked by similarity.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let count = self.index.count().await.map_err(RetrievalError::Index)?;
        if count == 0 {
            return Err(RetrievalError::EmptyIndex);
        }

        let vector = self
            .embedder
            .embed_one(query, EmbedRole::Query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let hits = self
            .index
            .query(&vector, self.top_k)
            .await
            .map_err(|e| match e.downcast_ref::<DimensionMismatch>() {
                Some(mismatch) => RetrievalError::DimensionMismatch(*mismatch),
                None => RetrievalError::Index(e),
            })?;

        let hits: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|h| !h.text.trim().is_empty())
            .filter(|h| self.min_score.map_or(true, |min| h.score >= min))
            .collect();

        if hits.is_empty() {
            return Err(RetrievalError::NoMatch);
        }
        tracing::debug!(hits = hits.len(), best = hits[0].score, "retrieved context");
        Ok(hits)
    }
}
