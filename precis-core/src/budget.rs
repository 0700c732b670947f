//! Summary levels and per-stage output budgets.
//!
//! Each [`SummaryLevel`] resolves to a fixed [`StageTargets`] record. The map
//! stage compresses every chunk to roughly half its size, and the reduce stage
//! aims at the level's target length.

use crate::tokens::tokens_for_words;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap on output tokens for a single map-stage call
pub const MAX_CHUNK_OUTPUT_TOKENS: u32 = 4000;

/// Hard cap on output tokens for the reduce-stage call
pub const MAX_REDUCE_OUTPUT_TOKENS: u32 = 16000;

/// Fraction of a chunk's tokens requested back from the map stage
pub const CHUNK_COMPRESSION_RATIO: f64 = 0.5;

#[derive(Debug, Error)]
#[error("Unknown summary level '{0}'. Expected concise, balanced or comprehensive.")]
pub struct ParseLevelError(String);

/// Requested verbosity of the final summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Concise,
    #[default]
    Balanced,
    Comprehensive,
}

impl SummaryLevel {
    pub const ALL: [SummaryLevel; 3] = [
        SummaryLevel::Concise,
        SummaryLevel::Balanced,
        SummaryLevel::Comprehensive,
    ];

    /// Resolve the static targets for this level
    pub fn targets(self) -> StageTargets {
        let (target_words, detail_descriptor, instruction_text) = match self {
            SummaryLevel::Comprehensive => (
                5000,
                "extremely comprehensive and detailed",
                "Provide an extremely comprehensive, detailed, and thorough summary. Include all key arguments, evidence, examples, data points, and nuances. Maintain the depth and richness of the original content.",
            ),
            SummaryLevel::Balanced => (
                2500,
                "balanced and substantial",
                "Provide a balanced, substantial summary that covers all main points, key arguments, and important details while maintaining readability and flow.",
            ),
            SummaryLevel::Concise => (
                800,
                "concise but complete",
                "Provide a concise summary focusing on the most critical points, main arguments, and key takeaways while ensuring completeness.",
            ),
        };

        StageTargets {
            level: self,
            target_words,
            target_tokens: tokens_for_words(target_words as usize),
            detail_descriptor,
            instruction_text,
        }
    }
}

impl std::fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryLevel::Concise => write!(f, "concise"),
            SummaryLevel::Balanced => write!(f, "balanced"),
            SummaryLevel::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

impl std::str::FromStr for SummaryLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "high"/"medium"/"low" are compression settings: high compression is concise
        match s.trim().to_lowercase().as_str() {
            "concise" | "high" => Ok(SummaryLevel::Concise),
            "balanced" | "medium" => Ok(SummaryLevel::Balanced),
            "comprehensive" | "low" => Ok(SummaryLevel::Comprehensive),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// Length and tone targets for one summarization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTargets {
    pub level: SummaryLevel,
    /// Desired length of the final summary in words
    pub target_words: u32,
    /// `target_words` converted to tokens
    pub target_tokens: u32,
    /// Short phrase describing the desired density, used in system prompts
    pub detail_descriptor: &'static str,
    /// Directive embedded in every prompt for this level
    pub instruction_text: &'static str,
}

impl StageTargets {
    /// Output budget for the reduce stage
    pub fn reduce_output_budget(&self) -> u32 {
        self.target_tokens.min(MAX_REDUCE_OUTPUT_TOKENS)
    }
}

/// Output budget for a single map-stage call over a chunk of `chunk_tokens`
pub fn per_chunk_output_budget(chunk_tokens: u32) -> u32 {
    let half = (chunk_tokens as f64 * CHUNK_COMPRESSION_RATIO).round() as u32;
    half.min(MAX_CHUNK_OUTPUT_TOKENS)
}
