//! Post-processing of a buffered model response.
//!
//! Turns raw model output plus the retrieval hits it was grounded on into the
//! text a user sees: reasoning spans stripped, a `Sources:` list appended, and
//! interrupted streams clearly labelled.

use regex::Regex;

use crate::models::{Answer, Citation, RetrievedChunk};

/// Base path under which the server returns ingested files.
pub const DOCUMENTS_PATH: &str = "/documents";

pub const EMPTY_RESPONSE: &str = "The model returned an empty response.";

const PARTIAL_MARKER: &str = "[Partial response]";

/// Removes every `start ... end` span, shortest match first, across lines.
///
/// An unterminated `start` marker is left in place. Markers are matched
/// literally.
#[derive(Debug, Clone)]
pub struct ReasoningFilter {
    re: Regex,
}

impl ReasoningFilter {
    pub fn new(start: &str, end: &str) -> Result<Self, regex::Error> {
        let pattern = format!("(?s){}.*?{}", regex::escape(start), regex::escape(end));
        Ok(Self {
            re: Regex::new(&pattern)?,
        })
    }

    pub fn strip(&self, text: &str) -> String {
        self.re.replace_all(text, "").trim().to_string()
    }
}

/// One citation per distinct source, in first-retrieved order.
pub fn collect_citations(chunks: &[RetrievedChunk], base_path: &str) -> Vec<Citation> {
    let base = base_path.trim_end_matches('/');
    let mut citations: Vec<Citation> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for chunk in chunks {
        if seen.contains(&chunk.source.as_str()) {
            continue;
        }
        seen.push(&chunk.source);
        // Sources are stored decoded; only the URL is re-encoded
        citations.push(Citation {
            url: format!("{}/{}", base, urlencoding::encode(&chunk.source)),
            name: chunk.source.clone(),
        });
    }
    citations
}

impl Answer {
    pub fn render(&self) -> String {
        let mut out = String::new();

        match &self.partial {
            Some(error) => {
                out.push_str(PARTIAL_MARKER);
                out.push('\n');
                if !self.text.is_empty() {
                    out.push_str(&self.text);
                    out.push_str("\n\n");
                }
                out.push_str("The response was interrupted: ");
                out.push_str(error);
            }
            None if self.text.is_empty() => out.push_str(EMPTY_RESPONSE),
            None => out.push_str(&self.text),
        }

        if !self.citations.is_empty() {
            out.push_str("\n\nSources:");
            for c in &self.citations {
                out.push_str(&format!("\n- [{}]({})", c.name, c.url));
            }
        }
        out
    }
}
