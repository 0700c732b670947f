//! # Precis Core
//!
//! Core library for Precis - a map-reduce document summarizer backed by a
//! hosted language model.
//!
//! This crate provides:
//! - Token estimation and chunk planning
//! - Summary levels and per-stage output budgets
//! - The map-reduce summarization pipeline with progress and cancellation
//! - A completion client for the Replicate predictions API
//! - PDF text extraction and quality checks
//! - Configuration management
//! - Shared report models

pub mod budget;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod model;
pub mod pdf;
pub mod progress;
pub mod summarizer;
pub mod tokens;

pub use budget::{StageTargets, SummaryLevel};
pub use chunker::{Chunk, ChunkError, ChunkPlan, ChunkPlanner};
pub use completion::{
    CompletionClient, CompletionError, CompletionRequest, ReplicateClient, SamplingParams,
};
pub use config::{Config, ConfigError, Credential};
pub use model::{ReportFormat, SummaryReport};
pub use pdf::{DocumentSource, ExtractionStats, PdfError, ValidationError};
pub use progress::{ProgressEvent, ProgressReporter, Stage};
pub use summarizer::{
    CancelHandle, FinalSummary, SummarizeError, Summarizer, SummarizerOptions, SummaryRun,
};
