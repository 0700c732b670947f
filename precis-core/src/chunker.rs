//! Chunk planning.
//!
//! Text is broken into semantic units (paragraphs, or sentences when the
//! paragraph structure is missing) and greedily packed into chunks while the
//! running sum of unit estimates fits a token ceiling. Units are never split:
//! a unit larger than the ceiling becomes a chunk of its own.

use crate::tokens::estimate_tokens;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Default token ceiling for a single chunk
pub const DEFAULT_MAX_CHUNK_TOKENS: u32 = 8000;

/// Paragraph splitting is abandoned for sentences when it yields at most
/// this many units on a text longer than [`SENTENCE_FALLBACK_MIN_CHARS`]
const SENTENCE_FALLBACK_MAX_UNITS: usize = 2;
const SENTENCE_FALLBACK_MIN_CHARS: usize = 500;

/// Separator placed between units inside a chunk
pub const UNIT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("No content to chunk")]
    EmptyInput,
}

/// How the text was broken into units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    Paragraphs,
    Sentences,
}

impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitMode::Paragraphs => write!(f, "paragraphs"),
            SplitMode::Sentences => write!(f, "sentences"),
        }
    }
}

/// A contiguous run of units sized for one model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the document (0-based)
    pub index: usize,
    /// Units joined with [`UNIT_SEPARATOR`]
    pub text: String,
    /// Estimated token count of the joined `text`
    pub estimated_tokens: u32,
    /// Number of units packed into this chunk
    pub unit_count: usize,
}

/// The ordered chunks for one document
#[derive(Debug, Clone, Serialize)]
pub struct ChunkPlan {
    pub split_mode: SplitMode,
    pub unit_count: usize,
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Splits text into chunks bounded by a token ceiling
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    max_chunk_tokens: u32,
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_TOKENS)
    }
}

impl ChunkPlanner {
    pub fn new(max_chunk_tokens: u32) -> Self {
        Self { max_chunk_tokens }
    }

    pub fn max_chunk_tokens(&self) -> u32 {
        self.max_chunk_tokens
    }

    /// Plan the chunks for a document
    pub fn plan(&self, text: &str) -> Result<ChunkPlan, ChunkError> {
        let (split_mode, units) = split_units(text);
        if units.is_empty() {
            return Err(ChunkError::EmptyInput);
        }

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        // Sum of per-unit estimates, not the estimate of the joined text
        let mut current_tokens = 0u32;

        for unit in &units {
            let unit_tokens = estimate_tokens(unit);

            if !current.is_empty() && current_tokens + unit_tokens > self.max_chunk_tokens {
                chunks.push(build_chunk(chunks.len(), &current));
                current.clear();
                current_tokens = 0;
            }

            current.push(unit);
            current_tokens += unit_tokens;
        }

        if !current.is_empty() {
            chunks.push(build_chunk(chunks.len(), &current));
        }

        debug!(
            "Planned {} chunks from {} {} (ceiling {} tokens)",
            chunks.len(),
            units.len(),
            split_mode,
            self.max_chunk_tokens
        );

        Ok(ChunkPlan {
            split_mode,
            unit_count: units.len(),
            chunks,
        })
    }
}

fn build_chunk(index: usize, units: &[&str]) -> Chunk {
    let text = units.join(UNIT_SEPARATOR);
    Chunk {
        index,
        estimated_tokens: estimate_tokens(&text),
        text,
        unit_count: units.len(),
    }
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"))
}

fn sentence_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("sentence pattern is valid"))
}

/// Break text into trimmed, non-empty semantic units in document order
pub fn split_units(text: &str) -> (SplitMode, Vec<&str>) {
    let paragraphs: Vec<&str> = paragraph_break()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() <= SENTENCE_FALLBACK_MAX_UNITS
        && text.chars().count() > SENTENCE_FALLBACK_MIN_CHARS
    {
        return (SplitMode::Sentences, split_sentences(text));
    }

    (SplitMode::Paragraphs, paragraphs)
}

/// Sentences keep their terminating punctuation
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for end_mark in sentence_end().find_iter(text) {
        push_sentence(&mut sentences, &text[start..end_mark.end()]);
        start = end_mark.end();
    }
    push_sentence(&mut sentences, &text[start..]);

    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    let has_content = trimmed
        .chars()
        .any(|c| !c.is_whitespace() && !matches!(c, '.' | '!' | '?'));
    if has_content {
        sentences.push(trimmed);
    }
}
