//! Shared data models for Precis.
//!
//! [`SummaryReport`] is what the CLI prints or saves: the final summary
//! together with where it came from and how it was produced.

use crate::budget::SummaryLevel;
use crate::pdf::DocumentSource;
use crate::summarizer::FinalSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output formats for a finished summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// The summary text only
    #[default]
    Text,
    Markdown,
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Markdown => write!(f, "markdown"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}

/// A finished summary with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Input path, or `None` for stdin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub source_pages: u32,
    pub source_words: usize,
    pub level: SummaryLevel,
    pub target_words: u32,
    pub model: String,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
    pub summary_words: usize,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

impl SummaryReport {
    pub fn new(source: &DocumentSource, summary: FinalSummary, model: impl Into<String>) -> Self {
        Self {
            title: source.title.clone(),
            author: source.author.clone(),
            source_path: None,
            source_pages: source.page_count,
            source_words: source.word_count,
            level: summary.level,
            target_words: summary.level.targets().target_words,
            model: model.into(),
            chunk_count: summary.chunk_count,
            degraded_chunks: summary.degraded_chunks,
            summary_words: summary.summary_words,
            summary: summary.text,
            generated_at: Utc::now(),
        }
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Summary length as a percentage of the source
    pub fn compression_percent(&self) -> f64 {
        if self.source_words == 0 {
            return 0.0;
        }
        self.summary_words as f64 * 100.0 / self.source_words as f64
    }

    /// Render in the requested format
    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(format!("{}\n", self.summary.trim_end())),
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => serde_json::to_string_pretty(self),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# {}\n\n", self.title));

        if let Some(author) = &self.author {
            md.push_str(&format!("*By {}*\n\n", author));
        }

        md.push_str("## Summary\n\n");
        md.push_str(self.summary.trim());
        md.push_str("\n\n");

        md.push_str("---\n\n");
        md.push_str(&format!(
            "*{} summary (target ~{} words): {} words from {} source words ({:.1}%)*\n",
            self.level,
            self.target_words,
            self.summary_words,
            self.source_words,
            self.compression_percent()
        ));
        if self.source_pages > 0 {
            md.push_str(&format!("*{} pages, {} chunks*\n", self.source_pages, self.chunk_count));
        } else {
            md.push_str(&format!("*{} chunks*\n", self.chunk_count));
        }
        if self.degraded_chunks > 0 {
            md.push_str(&format!(
                "*{} of {} sections could not be summarized and are marked in the text*\n",
                self.degraded_chunks, self.chunk_count
            ));
        }
        md.push_str(&format!(
            "*Generated by {} on {}*\n",
            self.model,
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));

        md
    }
}
