//! Ingestion pipeline orchestration.
//!
//! Coordinates one full rebuild: documents directory → extraction →
//! chunking → embedding → index. Every run replaces the index contents
//! entirely; there is no incremental mode.
//!
//! Unreadable, empty, and unsupported files are skipped with a warning.
//! An embedding or index failure aborts the run. Embedding finishes before the
//! index is touched, and the old records are swapped for the new ones in a
//! single transaction, so an aborted run leaves the previous index in place.

use anyhow::{Context, Result};

use crate::chunk::{chunk_document, TextChunker};
use crate::config::Config;
use crate::connector_fs;
use crate::embedding::{EmbedRole, Embedder};
use crate::index::VectorIndex;
use crate::models::{Chunk, IndexedRecord};

/// Counts reported at the end of an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub unsupported: usize,
    pub failed: usize,
    pub chunks: usize,
    /// Records removed from the previous index.
    pub cleared: usize,
    pub written: usize,
}

/// Scans and chunks the documents directory without touching the index.
pub fn collect_chunks(config: &Config) -> Result<(Vec<Chunk>, IngestReport)> {
    let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let scan = connector_fs::scan_documents(&config.documents.root)?;

    let mut chunks = Vec::new();
    for doc in &scan.documents {
        let doc_chunks = chunk_document(doc, &chunker, chunks.len());
        tracing::debug!(source = %doc.source, chunks = doc_chunks.len(), "chunked document");
        chunks.extend(doc_chunks);
    }

    let report = IngestReport {
        documents: scan.documents.len(),
        unsupported: scan.unsupported.len(),
        failed: scan.failed.len(),
        chunks: chunks.len(),
        ..Default::default()
    };
    Ok((chunks, report))
}

/// Rebuilds the index from the documents directory.
pub async fn run_ingest(
    config: &Config,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestReport> {
    let (chunks, mut report) = collect_chunks(config)?;
    tracing::info!(
        documents = report.documents,
        chunks = report.chunks,
        "loaded documents"
    );

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts, EmbedRole::Passage)
            .await
            .with_context(|| format!("Embedding failed (model {})", embedder.model_name()))?;
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "Embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            records.push(IndexedRecord {
                id: chunk.record_id(),
                seq: chunk.seq,
                vector,
                text: chunk.text.clone(),
                source: chunk.source.clone(),
            });
        }
        tracing::debug!(embedded = records.len(), total = chunks.len(), "embedding progress");
    }

    report.cleared = index
        .replace_all(&records)
        .await
        .context("Failed to write records to index")?;
    report.written = records.len();

    tracing::info!(written = report.written, cleared = report.cleared, "ingestion complete");
    Ok(report)
}

/// Prints a run summary in the CLI's `key: value` style.
pub fn print_report(report: &IngestReport, dry_run: bool) {
    if dry_run {
        println!("ingest (dry-run)");
    } else {
        println!("ingest");
    }
    println!("  documents loaded: {}", report.documents);
    println!("  unsupported skipped: {}", report.unsupported);
    println!("  extraction skipped: {}", report.failed);
    println!("  chunks: {}", report.chunks);
    if !dry_run {
        println!("  previous records cleared: {}", report.cleared);
        println!("  records written: {}", report.written);
    }
    println!("ok");
}
