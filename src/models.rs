//! Core data models used throughout the ingestion and query pipelines.
//!
//! These types represent the documents, chunks, index records, retrieval hits,
//! and answers that flow between pipeline stages.

use serde::Serialize;

/// Extracted text of one source file. Discarded after chunking.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    /// URL-decoded base filename of the originating file.
    pub source: String,
}

/// A span of a document's text, the unit that gets embedded and retrieved.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    /// Position of this chunk across the whole ingestion run.
    pub seq: usize,
}

impl Chunk {
    /// Index key for this chunk.
    pub fn record_id(&self) -> String {
        format!("chunk_{}", self.seq)
    }
}

/// A chunk plus its embedding, as written to the vector index.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub id: String,
    pub seq: usize,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
}

/// One hit from a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// A link back to an ingested file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Human-readable (decoded) file name.
    pub name: String,
    /// URL under which the server returns the original file.
    pub url: String,
}

/// The post-processed result of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Model output with reasoning spans removed.
    pub text: String,
    pub citations: Vec<Citation>,
    /// Error description when the model stream broke off mid-answer.
    pub partial: Option<String>,
}
