//! Map-reduce summarization pipeline.
//!
//! A run moves through `Idle -> Chunking -> Mapping -> Reducing -> Done`, or
//! ends in `Failed`. The map stage summarizes every chunk on its own; a chunk
//! whose completion call fails is replaced by an inline error marker and the
//! run carries on. The reduce stage merges the chunk summaries into a single
//! document; it has no fallback, so its failure fails the whole run.

use crate::budget::{per_chunk_output_budget, StageTargets, SummaryLevel};
use crate::chunker::{Chunk, ChunkError, ChunkPlanner, DEFAULT_MAX_CHUNK_TOKENS};
use crate::completion::{CompletionClient, CompletionRequest, SamplingParams};
use crate::config::{Credential, PipelineConfig};
use crate::progress::{self, map_progress, ProgressEvent, ProgressReporter, Stage};
use crate::tokens::{estimate_words, word_count};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Delimiter placed between chunk summaries in the synthesis prompt
pub const SECTION_DELIMITER: &str = "\n\n=== SECTION ===\n\n";

/// Errors that end a summarization run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Final synthesis failed: {0}")]
    Synthesis(String),

    #[error("Summarization was cancelled")]
    Cancelled,
}

impl From<ChunkError> for SummarizeError {
    fn from(err: ChunkError) -> Self {
        SummarizeError::Input(err.to_string())
    }
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Chunking,
    Mapping { chunk: usize, total: usize },
    Reducing,
    Done,
    Failed,
}

/// The map-stage output for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub text: String,
    /// The completion call failed and `text` is an error marker
    pub degraded: bool,
}

/// The result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub text: String,
    pub level: SummaryLevel,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
    pub source_words: usize,
    pub summary_words: usize,
}

/// Options for the pipeline
#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    /// Token ceiling for a single chunk
    pub max_chunk_tokens: u32,
    /// Map-stage calls in flight at once
    pub map_concurrency: usize,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            map_concurrency: 1,
        }
    }
}

impl SummarizerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chunk_tokens(mut self, tokens: u32) -> Self {
        self.max_chunk_tokens = tokens;
        self
    }

    pub fn with_map_concurrency(mut self, concurrency: usize) -> Self {
        self.map_concurrency = concurrency.max(1);
        self
    }
}

impl From<&PipelineConfig> for SummarizerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self::new()
            .with_max_chunk_tokens(config.max_chunk_tokens)
            .with_map_concurrency(config.map_concurrency)
    }
}

/// Cooperative cancellation shared between a run and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A run executing on its own task
pub struct SummaryRun {
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancelHandle,
    handle: JoinHandle<Result<FinalSummary, SummarizeError>>,
}

impl SummaryRun {
    /// Next progress event; `None` once the run has stopped reporting
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> Result<FinalSummary, SummarizeError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(SummarizeError::Cancelled),
        }
    }
}

/// State, progress and cancellation for one run
struct RunContext<'a> {
    state: RunState,
    reporter: &'a mut ProgressReporter,
    cancel: &'a CancelHandle,
}

impl RunContext<'_> {
    fn enter(&mut self, next: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: SummarizeError) -> SummarizeError {
        error!("Summarization failed in {:?}: {}", self.state, err);
        self.enter(RunState::Failed);
        self.reporter.close();
        err
    }

    fn checkpoint(&mut self) -> Result<(), SummarizeError> {
        if self.cancel.is_cancelled() {
            Err(self.fail(SummarizeError::Cancelled))
        } else {
            Ok(())
        }
    }
}

/// Summarizes documents through a completion client
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    credential: Credential,
    options: SummarizerOptions,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, credential: Credential) -> Self {
        Self {
            client,
            credential,
            options: SummarizerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SummarizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the pipeline on a spawned task
    pub fn spawn(self: Arc<Self>, text: String, level: SummaryLevel) -> SummaryRun {
        let (mut reporter, progress) = ProgressReporter::channel();
        let cancel = CancelHandle::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            self.run(&text, level, &mut reporter, &task_cancel).await
        });

        SummaryRun {
            progress,
            cancel,
            handle,
        }
    }

    /// Run the pipeline to completion on the current task
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), level = %level))]
    pub async fn run(
        &self,
        text: &str,
        level: SummaryLevel,
        reporter: &mut ProgressReporter,
        cancel: &CancelHandle,
    ) -> Result<FinalSummary, SummarizeError> {
        let mut ctx = RunContext {
            state: RunState::Idle,
            reporter,
            cancel,
        };

        if !self.credential.is_configured() {
            return Err(ctx.fail(SummarizeError::Configuration(
                "API token is not set. Set PRECIS_API_TOKEN or add api_token under [completion] in the config file.".to_string(),
            )));
        }
        if text.trim().is_empty() {
            return Err(ctx.fail(SummarizeError::Input(
                "No content to summarize".to_string(),
            )));
        }

        let targets = level.targets();
        let source_words = word_count(text);
        info!(
            "Summarizing {} words at {} level (target ~{} words)",
            source_words, level, targets.target_words
        );
        ctx.reporter.report(progress::STARTED, Stage::Started);

        ctx.enter(RunState::Chunking);
        let planner = ChunkPlanner::new(self.options.max_chunk_tokens);
        let plan = planner.plan(text).map_err(|e| ctx.fail(e.into()))?;
        info!(
            "Split document into {} chunks by {}",
            plan.len(),
            plan.split_mode
        );
        ctx.reporter.report(
            progress::CHUNKED,
            Stage::Chunked {
                chunks: plan.len(),
            },
        );

        let summaries = self.map_chunks(&plan.chunks, &targets, &mut ctx).await?;
        let degraded_chunks = summaries.iter().filter(|s| s.degraded).count();
        ctx.reporter.report(progress::MAPPED, Stage::Reducing);

        ctx.checkpoint()?;
        ctx.enter(RunState::Reducing);
        let text_out = self
            .reduce(&summaries, &targets)
            .await
            .map_err(|e| ctx.fail(e))?;

        ctx.enter(RunState::Done);
        ctx.reporter.report(progress::DONE, Stage::Done);

        let summary = FinalSummary {
            summary_words: word_count(&text_out),
            text: text_out,
            level,
            chunk_count: plan.len(),
            degraded_chunks,
            source_words,
        };
        info!(
            "Summary ready: {} words from {} chunks ({} degraded)",
            summary.summary_words, summary.chunk_count, summary.degraded_chunks
        );

        Ok(summary)
    }

    /// Summarize every chunk, preserving chunk order
    async fn map_chunks(
        &self,
        chunks: &[Chunk],
        targets: &StageTargets,
        ctx: &mut RunContext<'_>,
    ) -> Result<Vec<ChunkSummary>, SummarizeError> {
        let total = chunks.len();
        let cancel = ctx.cancel.clone();
        let client = Arc::clone(&self.client);
        let requests: Vec<(usize, u32, CompletionRequest)> = chunks
            .iter()
            .map(|chunk| {
                (
                    chunk.index,
                    chunk.estimated_tokens,
                    build_map_request(chunk, targets),
                )
            })
            .collect();

        // `buffered` yields in input order, so index alignment holds at any concurrency
        let calls = futures::stream::iter(requests)
            .map(move |(index, tokens, request)| {
                let client = Arc::clone(&client);
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    debug!(
                        "Summarizing chunk {}/{} (~{} tokens, budget {})",
                        index + 1,
                        total,
                        tokens,
                        request.params.max_output_tokens
                    );
                    Some(client.complete(&request).await)
                }
            })
            .buffered(self.options.map_concurrency.max(1));
        let mut calls = std::pin::pin!(calls);

        let mut summaries = Vec::with_capacity(total);
        while let Some(outcome) = calls.next().await {
            let chunk = &chunks[summaries.len()];
            ctx.enter(RunState::Mapping {
                chunk: chunk.index + 1,
                total,
            });

            let Some(outcome) = outcome else {
                return Err(ctx.fail(SummarizeError::Cancelled));
            };

            let summary = match outcome {
                Ok(text) => ChunkSummary {
                    index: chunk.index,
                    text,
                    degraded: false,
                },
                Err(e) => {
                    warn!("Chunk {} failed, continuing with a marker: {}", chunk.index + 1, e);
                    ChunkSummary {
                        index: chunk.index,
                        text: format!("Error processing chunk {}: {}", chunk.index + 1, e),
                        degraded: true,
                    }
                }
            };
            summaries.push(summary);

            let completed = summaries.len();
            ctx.reporter.report(
                map_progress(completed, total),
                Stage::Mapping { completed, total },
            );
        }

        Ok(summaries)
    }

    /// Merge the chunk summaries into the final text
    async fn reduce(
        &self,
        summaries: &[ChunkSummary],
        targets: &StageTargets,
    ) -> Result<String, SummarizeError> {
        let request = build_reduce_request(summaries, targets);
        debug!(
            "Synthesizing {} sections (~{} input tokens, budget {})",
            summaries.len(),
            request.estimate_input_tokens(),
            request.params.max_output_tokens
        );

        let text = self
            .client
            .complete(&request)
            .await
            .map_err(|e| SummarizeError::Synthesis(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(SummarizeError::Synthesis(
                "the model returned an empty summary".to_string(),
            ));
        }

        Ok(text)
    }
}

/// Prompt for one map-stage call
pub fn build_map_request(chunk: &Chunk, targets: &StageTargets) -> CompletionRequest {
    let system_prompt = format!(
        "You are an expert summarizer specializing in creating {} summaries. \
Your task is to process this text segment while preserving all important information, \
key arguments, supporting evidence, and relevant details. This is part of a multi-stage \
summarization process, so thoroughness is crucial.",
        targets.detail_descriptor
    );

    let prompt = format!(
        "{}\n\nText to summarize:\n{}\n\nCreate a detailed summary that preserves the essence and important details of this section:",
        targets.instruction_text, chunk.text
    );

    CompletionRequest::new(
        prompt,
        system_prompt,
        SamplingParams::map_stage(per_chunk_output_budget(chunk.estimated_tokens)),
    )
}

/// Prompt for the reduce-stage call
pub fn build_reduce_request(summaries: &[ChunkSummary], targets: &StageTargets) -> CompletionRequest {
    let combined = summaries
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_DELIMITER);

    let system_prompt = format!(
        "You are a master synthesizer capable of creating {} summaries. \
Your task is to integrate multiple detailed section summaries into one cohesive, \
comprehensive final summary that flows naturally and maintains the depth of the original content.",
        targets.detail_descriptor
    );

    let prompt = format!(
        r#"{}

Below are detailed summaries of different sections of a document. Your task is to synthesize
these into a single, cohesive, and comprehensive summary that:

1. Maintains all key information and arguments
2. Flows naturally as a unified document
3. Eliminates redundancy while preserving important details
4. Achieves approximately {} words

Section Summaries:
{}

Create a comprehensive final summary:"#,
        targets.instruction_text,
        estimate_words(targets.target_tokens),
        combined
    );

    CompletionRequest::new(
        prompt,
        system_prompt,
        SamplingParams::reduce_stage(targets.reduce_output_budget()),
    )
}
