//! Chat-completion client for OpenAI-compatible servers.
//!
//! [`ChatModel`] is the seam the query pipeline talks to; [`OpenAiChat`] is
//! the production implementation, speaking the streaming
//! `POST {base_url}/chat/completions` protocol used by OpenAI, LM Studio,
//! llama.cpp, vLLM and Ollama's compatibility layer.
//!
//! Responses arrive as server-sent events (`data: {json}` lines, terminated by
//! `data: [DONE]`). [`parse_sse`] turns the raw body into a [`TokenStream`] of
//! content deltas and [`drain`] buffers a whole stream, keeping whatever
//! arrived before a mid-stream failure.
//!
//! Requests are bounded by one overall timeout and never retried.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Transport-level failures, each surfaced to the user differently.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("could not connect to the language model server at {url}: {detail}")]
    Connection { url: String, detail: String },
    #[error("the language model did not respond within {secs} seconds")]
    Timeout { secs: u64 },
    #[error("the language model server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("error communicating with the language model: {0}")]
    Transport(String),
}

/// Incremental content deltas from the model.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

/// One chat turn: a system message and a user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Starts a streamed completion.
    ///
    /// Errors raised before the first byte (connection, status, timeout) are
    /// returned directly; later failures arrive as stream items.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TokenStream, LlmError>;
}

/// Streaming client for an OpenAI-compatible endpoint.
pub struct OpenAiChat {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Maps a reqwest failure onto the user-facing categories.
fn classify(err: reqwest::Error, url: &str, timeout_secs: u64) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { secs: timeout_secs }
    } else if err.is_connect() {
        LlmError::Connection {
            url: url.to_string(),
            detail: err.to_string(),
        }
    } else {
        LlmError::Transport(err.to_string())
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TokenStream, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let url = self.base_url.clone();
        let secs = self.timeout_secs;
        let bytes = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify(e, &url, secs)));
        Ok(parse_sse(Box::pin(bytes)))
    }
}

struct SseState<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            // Comments, `event:` and blank separator lines
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(json) => {
                if let Some(err) = json.get("error") {
                    self.pending.push_back(Err(LlmError::Transport(format!(
                        "model server reported an error: {}",
                        err
                    ))));
                    self.finished = true;
                } else if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                    if !content.is_empty() {
                        self.pending.push_back(Ok(content.to_string()));
                    }
                }
            }
            Err(e) => {
                self.pending.push_back(Err(LlmError::Transport(format!(
                    "malformed stream event: {}",
                    e
                ))));
                self.finished = true;
            }
        }
    }
}

/// Decodes an SSE body into content deltas.
///
/// Lines may be split arbitrarily across input chunks, including inside a
/// multi-byte character.
pub fn parse_sse<S, B>(inner: S) -> TokenStream
where
    S: Stream<Item = Result<B, LlmError>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        inner,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(bytes.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    let rest = std::mem::take(&mut st.buffer);
                    st.handle_line(&String::from_utf8_lossy(&rest));
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// A fully buffered completion.
#[derive(Debug)]
pub struct Drained {
    pub text: String,
    /// Set when the stream failed; `text` then holds what arrived before.
    pub error: Option<LlmError>,
}

/// Consumes a token stream to the end or to its first error.
pub async fn drain(mut stream: TokenStream) -> Drained {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(token) => text.push_str(&token),
            Err(e) => {
                return Drained {
                    text,
                    error: Some(e),
                }
            }
        }
    }
    Drained { text, error: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: Vec<&'static [u8]>) -> TokenStream {
        let items: Vec<Result<&'static [u8], LlmError>> = chunks.into_iter().map(Ok).collect();
        parse_sse(stream::iter(items))
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[tokio::test]
    async fn collects_deltas_until_done() {
        let raw = format!(
            "{}{}: keep-alive\n\n{}data: [DONE]\n\n{}",
            delta("Hel"),
            delta("lo"),
            delta("!"),
            delta("ignored")
        );
        let raw: &'static [u8] = Box::leak(raw.into_bytes().into_boxed_slice());
        let drained = drain(body(vec![raw])).await;
        assert_eq!(drained.text, "Hello!");
        assert!(drained.error.is_none());
    }

    #[tokio::test]
    async fn handles_lines_split_across_chunks() {
        let raw = delta("héllo wörld");
        let bytes: &'static [u8] = Box::leak(raw.into_bytes().into_boxed_slice());
        // Split inside the multi-byte 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let drained = drain(body(vec![&bytes[..split], &bytes[split..]])).await;
        assert_eq!(drained.text, "héllo wörld");
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_parsed() {
        let raw = delta("tail");
        let raw: &'static [u8] = Box::leak(raw.trim_end().to_string().into_bytes().into_boxed_slice());
        assert_eq!(drain(body(vec![raw])).await.text, "tail");
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let first: &'static [u8] = Box::leak(delta("partial ").into_bytes().into_boxed_slice());
        let items: Vec<Result<&'static [u8], LlmError>> = vec![
            Ok(first),
            Err(LlmError::Transport("connection reset".to_string())),
        ];
        let drained = drain(parse_sse(stream::iter(items))).await;
        assert_eq!(drained.text, "partial ");
        assert!(matches!(drained.error, Some(LlmError::Transport(_))));
    }

    #[tokio::test]
    async fn error_event_ends_stream() {
        let drained = drain(body(vec![b"data: {\"error\":{\"message\":\"model unloaded\"}}\n\n"])).await;
        assert_eq!(drained.text, "");
        assert!(drained.error.unwrap().to_string().contains("model unloaded"));
    }

    #[tokio::test]
    async fn malformed_event_is_transport_error() {
        let drained = drain(body(vec![b"data: {not json\n\n"])).await;
        assert!(matches!(drained.error, Some(LlmError::Transport(_))));
    }
}
