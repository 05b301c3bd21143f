#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use docrag::config::Config;
use docrag::embedding::{EmbedRole, Embedder};
use docrag::index::{InMemoryIndex, VectorIndex};
use docrag::llm::{ChatModel, ChatRequest, LlmError, TokenStream};
use docrag::models::IndexedRecord;
use docrag::pipeline::{PipelineSettings, RagPipeline};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIMS: usize = 256;

/// Bag-of-words embedder: each lowercase word bumps one hashed dimension.
/// Texts sharing words are similar, identical texts have similarity 1.
pub struct WordEmbedder {
    pub calls: AtomicUsize,
}

impl WordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding backend unavailable")
    }
}

type Responder = Box<dyn Fn() -> Result<TokenStream, LlmError> + Send + Sync>;

/// Chat model that replays a fixed response and records what it was asked.
pub struct ScriptedChat {
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<ChatRequest>>,
    respond: Responder,
}

impl ScriptedChat {
    fn with(respond: Responder) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            respond,
        }
    }

    /// Streams `tokens` and finishes cleanly.
    pub fn tokens(tokens: &[&str]) -> Self {
        let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        Self::with(Box::new(move || -> Result<TokenStream, LlmError> {
            let items: Vec<Result<String, LlmError>> = tokens.iter().cloned().map(Ok).collect();
            Ok(stream::iter(items).boxed())
        }))
    }

    /// Streams `tokens`, then fails with `error()`.
    pub fn broken_after(tokens: &[&str], error: fn() -> LlmError) -> Self {
        let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        Self::with(Box::new(move || -> Result<TokenStream, LlmError> {
            let mut items: Vec<Result<String, LlmError>> =
                tokens.iter().cloned().map(Ok).collect();
            items.push(Err(error()));
            Ok(stream::iter(items).boxed())
        }))
    }

    /// Fails before streaming anything.
    pub fn failing(error: fn() -> LlmError) -> Self {
        Self::with(Box::new(move || -> Result<TokenStream, LlmError> { Err(error()) }))
    }

    pub fn panicking() -> Self {
        Self::with(Box::new(|| -> Result<TokenStream, LlmError> {
            panic!("chat backend exploded")
        }))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TokenStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        (self.respond)()
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        system_prompt: "You are a helpful assistant.".to_string(),
        temperature: 0.1,
        max_tokens: 1024,
        reasoning_start: "<think>".to_string(),
        reasoning_end: "</think>".to_string(),
        top_k: 3,
        min_score: None,
    }
}

pub fn record(seq: usize, source: &str, text: &str) -> IndexedRecord {
    IndexedRecord {
        id: format!("chunk_{}", seq),
        seq,
        vector: WordEmbedder::vector(text),
        text: text.to_string(),
        source: source.to_string(),
    }
}

/// An in-memory index holding `records`.
pub async fn index_with(records: &[IndexedRecord]) -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new());
    index.upsert_batch(records).await.unwrap();
    index
}

pub fn pipeline(
    index: Arc<dyn VectorIndex>,
    chat: Arc<ScriptedChat>,
    settings: PipelineSettings,
) -> RagPipeline {
    RagPipeline::new(Arc::new(WordEmbedder::new()), index, chat, settings)
}

/// Writes a config for a temp workspace with its documents under `root/docs`.
pub fn write_config(root: &Path, extra: &str) -> Config {
    let docs = root.join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    let content = format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[documents]
root = "{root}/docs"

[chunking]
chunk_size = 200
chunk_overlap = 20

[server]
bind = "127.0.0.1:0"
{extra}
"#,
        root = root.display(),
        extra = extra
    );
    let path = root.join("rag.toml");
    std::fs::write(&path, content).unwrap();
    docrag::config::load_config(&path).unwrap()
}
