//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only storage surface the pipelines see:
//! ingestion replaces its contents, the retriever counts and queries it.
//! Two backends implement it:
//!
//! - [`SqliteIndex`]: one `records` table in SQLite, brute-force cosine
//!   similarity computed in Rust over every stored vector.
//! - [`InMemoryIndex`]: the same semantics over a `BTreeMap`, for tests and
//!   throwaway runs.
//!
//! Implementations are `Send + Sync` and safe for concurrent readers.
//! A query whose vector length differs from the stored vectors fails with
//! [`DimensionMismatch`] instead of scoring everything as zero.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{IndexedRecord, RetrievedChunk};

/// Storage for embedded chunks with nearest-neighbour lookup.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace one record by id |
/// | [`upsert_batch`](VectorIndex::upsert_batch) | Insert or replace many records |
/// | [`replace_all`](VectorIndex::replace_all) | Swap the whole contents in one step |
/// | [`query`](VectorIndex::query) | Top-k records by cosine similarity |
/// | [`count`](VectorIndex::count) | Number of stored records |
/// | [`sources`](VectorIndex::sources) | Record count per source file |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, record: &IndexedRecord) -> Result<()>;

    async fn upsert_batch(&self, records: &[IndexedRecord]) -> Result<()> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    /// Removes every record and stores `records` instead, atomically.
    /// Returns the number of records removed.
    async fn replace_all(&self, records: &[IndexedRecord]) -> Result<usize>;

    /// Returns at most `k` records, best match first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    async fn count(&self) -> Result<usize>;

    /// Record counts grouped by source, sorted by source name.
    async fn sources(&self) -> Result<Vec<(String, usize)>>;
}

/// The stored vectors were produced by a different embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index holds {stored}-dimensional vectors but the query has {query}")]
pub struct DimensionMismatch {
    pub stored: usize,
    pub query: usize,
}

fn check_dims(stored: usize, query: usize) -> Result<()> {
    if stored != query {
        return Err(DimensionMismatch { stored, query }.into());
    }
    Ok(())
}

/// Ranks `(seq, hit)` pairs by descending score, ties broken by ingestion order.
fn rank(mut scored: Vec<(usize, RetrievedChunk)>, k: usize) -> Vec<RetrievedChunk> {
    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, hit)| hit).collect()
}

// ============ SQLite ============

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Opens the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO records (id, seq, source, text, embedding, dims, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        seq = excluded.seq,
        source = excluded.source,
        text = excluded.text,
        embedding = excluded.embedding,
        dims = excluded.dims,
        created_at = excluded.created_at
"#;

async fn insert_records(
    tx: &mut Transaction<'_, Sqlite>,
    records: &[IndexedRecord],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for record in records {
        sqlx::query(UPSERT_SQL)
            .bind(&record.id)
            .bind(record.seq as i64)
            .bind(&record.source)
            .bind(&record.text)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, record: &IndexedRecord) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(record)).await
    }

    async fn upsert_batch(&self, records: &[IndexedRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_records(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_all(&self, records: &[IndexedRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM records")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        insert_records(&mut tx, records).await?;
        // Dropping the transaction on error rolls the delete back
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query("SELECT seq, source, text, embedding, dims FROM records")
            .fetch_all(&self.pool)
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            check_dims(dims as usize, vector.len())?;
            let blob: Vec<u8> = row.get("embedding");
            let seq: i64 = row.get("seq");
            let hit = RetrievedChunk {
                text: row.get("text"),
                source: row.get("source"),
                score: cosine_similarity(vector, &blob_to_vec(&blob)),
            };
            scored.push((seq as usize, hit));
        }

        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn sources(&self) -> Result<Vec<(String, usize)>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM records GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let n: i64 = row.get("n");
                (row.get("source"), n as usize)
            })
            .collect())
    }
}

// ============ In-memory ============

/// In-memory index for tests.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<BTreeMap<String, IndexedRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, record: &IndexedRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn replace_all(&self, records: &[IndexedRecord]) -> Result<usize> {
        let fresh: BTreeMap<String, IndexedRecord> = records
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();
        let previous = std::mem::replace(&mut *self.records.write().await, fresh);
        Ok(previous.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let records = self.records.read().await;
        let mut scored = Vec::with_capacity(records.len());
        for r in records.values() {
            check_dims(r.vector.len(), vector.len())?;
            let hit = RetrievedChunk {
                text: r.text.clone(),
                source: r.source.clone(),
                score: cosine_similarity(vector, &r.vector),
            };
            scored.push((r.seq, hit));
        }
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn sources(&self) -> Result<Vec<(String, usize)>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in self.records.read().await.values() {
            *counts.entry(r.source.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
