//! # docrag
//!
//! Retrieval-augmented chat over a local directory of documents.
//!
//! Ingestion loads every text, PDF and Word file in the documents directory,
//! splits it into overlapping chunks, embeds each chunk and rebuilds a SQLite
//! vector index. Queries embed the question, retrieve the closest chunks, ask
//! an OpenAI-compatible chat model to answer from them, and return the
//! cleaned answer with links to the files it drew on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  docs dir   │──▶│   ingest    │──▶│  SQLite   │
//! │ txt/pdf/docx│   │ chunk+embed │   │  vectors  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ retrieve
//!                   ┌─────────────┐   ┌────▼─────┐
//!                   │  LLM server │◀──│ pipeline │
//!                   │ (streaming) │──▶│ + answer │
//!                   └─────────────┘   └────┬─────┘
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (rag)   │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from txt, PDF and DOCX |
//! | [`connector_fs`] | Documents directory scanner |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index trait and backends |
//! | [`ingest`] | Full index rebuild |
//! | [`retrieve`] | Query-side retrieval |
//! | [`prompt`] | Prompt construction |
//! | [`llm`] | Streaming chat-completion client |
//! | [`answer`] | Response cleanup and citations |
//! | [`pipeline`] | Query pipeline and error boundary |
//! | [`server`] | HTTP chat server |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod stats;
