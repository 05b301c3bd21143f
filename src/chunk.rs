//! Overlapping, boundary-aware text chunker.
//!
//! Splits document text into spans of at most `size` characters where every
//! span after the first starts with the last `overlap` characters of the span
//! before it. Inside each window the cut prefers, in order, a paragraph
//! break, a line break, a sentence end, and a space; only when none of those
//! leaves the chunk longer than `overlap` does it fall back to a hard cut.
//!
//! Spans borrow from the input, so dropping the first `overlap` characters of
//! every span but the first and concatenating reproduces the text exactly.

use anyhow::{bail, Result};

use crate::models::{Chunk, Document};

/// Preferred break points, strongest first. The cut lands after the separator.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Chunking parameters, validated once and reused for every document.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            bail!("chunk size must be > 0");
        }
        if overlap >= size {
            bail!("chunk overlap ({}) must be < chunk size ({})", overlap, size);
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Returns a lazy iterator over the chunks of `text`.
    ///
    /// The iterator is `Clone`, so a sequence can be restarted by cloning it
    /// before consumption or by calling `chunks` again.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            size: self.size,
            overlap: self.overlap,
            start: 0,
            done: text.is_empty(),
        }
    }
}

/// Iterator returned by [`TextChunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    size: usize,
    overlap: usize,
    /// Byte offset of the next chunk.
    start: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.start..];
        let hard_end = byte_offset_of_char(rest, self.size);
        if hard_end == rest.len() {
            self.done = true;
            return Some(rest);
        }

        // A chunk must hold more than `overlap` chars or the next one would
        // start where this one did.
        let min_end = byte_offset_of_char(rest, self.overlap + 1);
        let window = &rest[..hard_end];
        let end = SEPARATORS
            .iter()
            .find_map(|sep| {
                window
                    .rfind(sep)
                    .map(|pos| pos + sep.len())
                    .filter(|&cut| cut >= min_end)
            })
            .unwrap_or(hard_end);

        let chunk = &rest[..end];
        let chunk_chars = chunk.chars().count();
        let advance = byte_offset_of_char(chunk, chunk_chars - self.overlap);
        self.start += advance;
        Some(chunk)
    }
}

/// Byte offset of the `n`-th char of `s`, or `s.len()` when `s` is shorter.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Chunks one document, numbering chunks from `first_seq`.
///
/// Whitespace-only spans carry nothing retrievable and are dropped.
pub fn chunk_document(doc: &Document, chunker: &TextChunker, first_seq: usize) -> Vec<Chunk> {
    chunker
        .chunks(&doc.text)
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(i, piece)| Chunk {
            text: piece.to_string(),
            source: doc.source.clone(),
            seq: first_seq + i,
        })
        .collect()
}
