//! Chunking policies for splitting corpus documents.
//!
//! Every policy measures length in characters, never bytes. The corpus
//! is Chinese prose where one character is three UTF-8 bytes, so byte
//! arithmetic would both miscount and split inside code points.

use crate::config::ChunkingConfig;
use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Sentence-ending characters for the semantic policy. Each delimiter
/// stays attached to the sentence it terminates.
const SENTENCE_DELIMITERS: [char; 4] = ['。', '？', '！', '\n'];

/// How a document is split into retrievable chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Consecutive non-overlapping spans of `size` characters. The last
    /// span keeps whatever is left, however short.
    FixedSize { size: usize },
    /// Spans of `size` characters starting every `size - overlap`
    /// characters. Requires `overlap < size`, which `Config::validate`
    /// enforces.
    SlidingWindow { size: usize, overlap: usize },
    /// Whole sentences accumulated greedily up to `max_len` characters.
    /// A single sentence longer than the limit becomes its own chunk,
    /// unsplit.
    Semantic { max_len: usize },
}

impl ChunkPolicy {
    /// The three policies every evaluation run compares, in report order.
    pub fn standard_set(config: &ChunkingConfig) -> Vec<ChunkPolicy> {
        vec![
            ChunkPolicy::FixedSize {
                size: config.fixed_size,
            },
            ChunkPolicy::SlidingWindow {
                size: config.window_size,
                overlap: config.window_overlap,
            },
            ChunkPolicy::Semantic {
                max_len: config.semantic_max_len,
            },
        ]
    }

    /// Short name used in collection names and report rows.
    pub fn label(&self) -> &'static str {
        match self {
            ChunkPolicy::FixedSize { .. } => "fixed",
            ChunkPolicy::SlidingWindow { .. } => "sliding",
            ChunkPolicy::Semantic { .. } => "semantic",
        }
    }

    /// Split `text` into chunks. Whitespace-only spans are dropped, so
    /// empty input yields no chunks under any policy.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text).into_iter().map(|(_, text)| text).collect()
    }

    /// Spans with the start offset of each, in characters.
    fn spans(&self, text: &str) -> Vec<(usize, String)> {
        let spans = match *self {
            ChunkPolicy::FixedSize { size } => fixed_spans(text, size),
            ChunkPolicy::SlidingWindow { size, overlap } => sliding_spans(text, size, overlap),
            ChunkPolicy::Semantic { max_len } => semantic_spans(text, max_len),
        };

        spans
            .into_iter()
            .filter(|(_, span)| !span.trim().is_empty())
            .collect()
    }
}

impl std::fmt::Display for ChunkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A retrievable unit of text, tagged with where in the corpus it came
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Name of the source document.
    pub source: String,
    /// Offset of the chunk's first character within the document,
    /// counted in characters.
    pub start: usize,
}

/// Chunk a document, tagging every chunk with the document name and its
/// position in the text.
pub fn chunk_document(policy: ChunkPolicy, document: &Document) -> Vec<Chunk> {
    policy
        .spans(&document.content)
        .into_iter()
        .map(|(start, text)| Chunk {
            text,
            source: document.name.clone(),
            start,
        })
        .collect()
}

fn fixed_spans(text: &str, size: usize) -> Vec<(usize, String)> {
    debug_assert!(size > 0);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .enumerate()
        .map(|(i, span)| (i * size, span.iter().collect()))
        .collect()
}

fn sliding_spans(text: &str, size: usize, overlap: usize) -> Vec<(usize, String)> {
    debug_assert!(size > 0 && overlap < size);
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();

    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        spans.push((start, chars[start..end].iter().collect()));

        // The window that reaches the end is emitted before stopping,
        // so a trailing stub shorter than the overlap never appears.
        if start + size >= chars.len() {
            break;
        }
        start += size - overlap;
    }

    spans
}

fn semantic_spans(text: &str, max_len: usize) -> Vec<(usize, String)> {
    debug_assert!(max_len > 0);
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut current_start = 0;
    let mut pos = 0;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len <= max_len {
            current.push_str(&sentence);
            current_len += sentence_len;
        } else {
            if !current.is_empty() {
                spans.push((current_start, current));
            }
            current = sentence;
            current_len = sentence_len;
            current_start = pos;
        }
        pos += sentence_len;
    }

    if !current.is_empty() {
        spans.push((current_start, current));
    }

    spans
}

/// Split text after every sentence delimiter, keeping the delimiter.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if SENTENCE_DELIMITERS.contains(&ch) {
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}
