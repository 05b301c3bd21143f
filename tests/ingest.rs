mod common;

use common::*;
use docrag::index::{InMemoryIndex, SqliteIndex, VectorIndex};
use docrag::ingest::{collect_chunks, run_ingest};
use docrag::retrieve::Retriever;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const HANDBOOK: &str = "The office opens at eight in the morning. Visitors sign in at reception.\n\n\
Expense reports are due on the fifth working day of each month. Late reports are paid in the next cycle.\n\n\
Laptops are replaced every three years. Broken equipment goes to the IT desk on the second floor.";

fn workspace() -> (TempDir, docrag::config::Config) {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let docs = &config.documents.root;
    fs::write(docs.join("handbook.txt"), HANDBOOK).unwrap();
    fs::write(
        docs.join("faq.md"),
        "Parking is free for employees. The cafeteria serves lunch from noon until two.",
    )
    .unwrap();
    (tmp, config)
}

#[tokio::test]
async fn ingest_populates_index() {
    let (_tmp, config) = workspace();
    let index = InMemoryIndex::new();

    let report = run_ingest(&config, &WordEmbedder::new(), &index).await.unwrap();
    assert_eq!(report.documents, 2);
    assert!(report.chunks >= 3, "handbook should span several chunks");
    assert_eq!(report.written, report.chunks);
    assert_eq!(report.cleared, 0);
    assert_eq!(index.count().await.unwrap(), report.chunks);

    let sources = index.sources().await.unwrap();
    let names: Vec<&str> = sources.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(names, vec!["faq.md", "handbook.txt"]);
}

#[tokio::test]
async fn reingest_replaces_instead_of_accumulating() {
    let (_tmp, config) = workspace();
    let index = InMemoryIndex::new();
    let embedder = WordEmbedder::new();

    let first = run_ingest(&config, &embedder, &index).await.unwrap();
    let second = run_ingest(&config, &embedder, &index).await.unwrap();
    assert_eq!(second.cleared, first.written);
    assert_eq!(index.count().await.unwrap(), first.chunks);

    // Removing a file removes its records on the next run
    fs::remove_file(config.documents.root.join("faq.md")).unwrap();
    run_ingest(&config, &embedder, &index).await.unwrap();
    let sources = index.sources().await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].0, "handbook.txt");
}

#[tokio::test]
async fn every_chunk_retrieves_itself_first() {
    let (_tmp, config) = workspace();
    let index = Arc::new(SqliteIndex::open(&config.db.path).await.unwrap());
    let embedder = Arc::new(WordEmbedder::new());
    run_ingest(&config, embedder.as_ref(), index.as_ref()).await.unwrap();

    let (chunks, _) = collect_chunks(&config).unwrap();
    let retriever = Retriever::new(embedder, index.clone(), 3, None);
    for chunk in &chunks {
        let hits = retriever.retrieve(&chunk.text).await.unwrap();
        assert_eq!(hits[0].text, chunk.text);
        assert_eq!(hits[0].source, chunk.source);
        assert!(hits.len() <= 3);
    }
    index.close().await;
}

#[tokio::test]
async fn bad_files_are_skipped() {
    let (_tmp, config) = workspace();
    let docs = &config.documents.root;
    fs::write(docs.join("image.png"), [0x89, b'P', b'N', b'G']).unwrap();
    fs::write(docs.join("broken.pdf"), b"not a pdf at all").unwrap();
    fs::write(docs.join("empty.txt"), "   \n\n  ").unwrap();
    fs::write(docs.join("corrupt.docx"), b"PK but not really").unwrap();

    let index = InMemoryIndex::new();
    let report = run_ingest(&config, &WordEmbedder::new(), &index).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.unsupported, 1);
    assert_eq!(report.failed, 3);
    assert_eq!(index.sources().await.unwrap().len(), 2);
}

#[tokio::test]
async fn encoded_file_names_are_decoded() {
    let (_tmp, config) = workspace();
    fs::write(
        config.documents.root.join("team%20roster.txt"),
        "Alice leads the platform team.",
    )
    .unwrap();

    let index = InMemoryIndex::new();
    run_ingest(&config, &WordEmbedder::new(), &index).await.unwrap();
    let sources = index.sources().await.unwrap();
    assert!(sources.iter().any(|(s, _)| s == "team roster.txt"));
}

#[tokio::test]
async fn embedding_failure_keeps_previous_index() {
    let (_tmp, config) = workspace();
    let index = InMemoryIndex::new();
    let first = run_ingest(&config, &WordEmbedder::new(), &index).await.unwrap();

    let err = run_ingest(&config, &FailingEmbedder, &index).await.unwrap_err();
    assert!(format!("{:#}", err).contains("embedding backend unavailable"));
    assert_eq!(index.count().await.unwrap(), first.written);
}

#[tokio::test]
async fn failed_index_write_keeps_previous_index() {
    let (_tmp, config) = workspace();
    let pool = docrag::db::connect(&config.db.path).await.unwrap();
    docrag::migrate::run_migrations(&pool).await.unwrap();
    let index = SqliteIndex::from_pool(pool.clone());
    let embedder = WordEmbedder::new();
    let first = run_ingest(&config, &embedder, &index).await.unwrap();

    // Any insert for faq.md now aborts, after the old rows were deleted
    sqlx::query(
        "CREATE TRIGGER reject_faq BEFORE INSERT ON records \
         WHEN NEW.source = 'faq.md' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = run_ingest(&config, &embedder, &index).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to write records"));
    assert_eq!(index.count().await.unwrap(), first.written);
    assert_eq!(index.sources().await.unwrap().len(), 2);
    index.close().await;
}

#[tokio::test]
async fn missing_documents_directory_is_fatal() {
    let (_tmp, mut config) = workspace();
    config.documents.root = config.documents.root.join("nope");
    let err = run_ingest(&config, &WordEmbedder::new(), &InMemoryIndex::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn dry_run_counts_without_writing() {
    let (_tmp, config) = workspace();
    let (chunks, report) = collect_chunks(&config).unwrap();
    assert_eq!(report.chunks, chunks.len());
    assert_eq!(report.written, 0);
    assert!(!config.db.path.exists());

    // Sequence numbers run across the whole batch
    let seqs: Vec<usize> = chunks.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, (0..chunks.len()).collect::<Vec<_>>());
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
}
