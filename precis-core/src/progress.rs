//! Progress reporting for summarization runs.
//!
//! A run reports integer percentages in `[0, 100]` over an unbounded channel.
//! The reporter guarantees that observed values never decrease, and once it
//! is closed (the run failed or was cancelled) nothing else is sent.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Run accepted and validated
pub const STARTED: u8 = 10;
/// Chunk plan ready
pub const CHUNKED: u8 = 20;
/// All chunks summarized
pub const MAPPED: u8 = 80;
/// Final summary delivered
pub const DONE: u8 = 100;

/// Pipeline phase a progress value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Started,
    Chunked { chunks: usize },
    Mapping { completed: usize, total: usize },
    Reducing,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Started => write!(f, "Starting"),
            Stage::Chunked { chunks } => write!(f, "Planned {} chunks", chunks),
            Stage::Mapping { completed, total } => {
                write!(f, "Summarized chunk {}/{}", completed, total)
            }
            Stage::Reducing => write!(f, "Synthesizing final summary"),
            Stage::Done => write!(f, "Done"),
        }
    }
}

/// A single progress observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    #[serde(flatten)]
    pub stage: Stage,
}

/// Progress after `completed` of `total` chunks: spans `[CHUNKED, MAPPED]`
pub fn map_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return MAPPED;
    }
    let span = (MAPPED - CHUNKED) as usize;
    let completed = completed.min(total);
    CHUNKED + (completed * span / total) as u8
}

/// Emits monotonic progress events to an optional listener
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    last: u8,
    closed: bool,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            last: 0,
            closed: false,
        }
    }

    /// Create a reporter together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Most recent value reported
    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Report a value. Values lower than the last one are dropped.
    pub fn report(&mut self, percent: u8, stage: Stage) {
        if self.closed {
            return;
        }

        let percent = percent.min(DONE);
        if percent < self.last {
            debug!(
                "Dropping regressing progress {} (last {})",
                percent, self.last
            );
            return;
        }
        self.last = percent;

        if let Some(tx) = &self.tx {
            if tx.send(ProgressEvent { percent, stage }).is_err() {
                debug!("Progress listener went away");
                self.tx = None;
            }
        }
    }

    /// Stop reporting for the rest of the run
    pub fn close(&mut self) {
        self.closed = true;
        self.tx = None;
    }
}
