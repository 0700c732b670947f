//! `precis summarize` command - run the map-reduce pipeline on a document

use super::input::load_document;
use anyhow::{bail, Result};
use precis_core::{
    Config, ProgressEvent, ReplicateClient, ReportFormat, SummarizeError, Summarizer,
    SummarizerOptions, SummaryLevel, SummaryReport,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const BAR_WIDTH: usize = 30;

pub async fn run(
    config: Config,
    input: String,
    level: Option<SummaryLevel>,
    format: ReportFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let level = level.unwrap_or(config.pipeline.default_level);
    let credential = config.credential();
    if !credential.is_configured() {
        bail!(
            "API token is not set. Export PRECIS_API_TOKEN (or REPLICATE_API_TOKEN), \
             or set api_token under [completion] in the config file."
        );
    }

    let source = load_document(&input, &config.validation)?;
    let source = match source.require_quality() {
        Ok(source) => source,
        Err(reason) => bail!("Document is not suitable for summarization: {}", reason),
    };

    let targets = level.targets();
    eprintln!("📄 {} ({} words)", source.title, source.word_count);
    eprintln!(
        "🎯 {} summary, target ~{} words",
        level, targets.target_words
    );

    let client = ReplicateClient::from_config(&config.completion, &credential)?;
    let model = client.model().to_string();
    let summarizer = Arc::new(
        Summarizer::new(Arc::new(client), credential)
            .with_options(SummarizerOptions::from(&config.pipeline)),
    );

    info!("Starting summarization with {}", model);
    let mut run = summarizer.spawn(source.text.clone(), level);
    let cancel = run.cancel_handle();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = run.next_progress() => match event {
                Some(event) => draw_progress(&event),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                cancel.cancel();
                eprintln!("\n⏹  Cancelling after the current request...");
            }
        }
    }
    eprintln!();

    let summary = match run.wait().await {
        Ok(summary) => summary,
        Err(SummarizeError::Cancelled) => bail!("Summarization cancelled"),
        Err(e) => return Err(e.into()),
    };

    if summary.degraded_chunks > 0 {
        eprintln!(
            "⚠️  {} of {} sections could not be summarized; the summary marks where they were.",
            summary.degraded_chunks, summary.chunk_count
        );
    }

    let mut report = SummaryReport::new(&source, summary, model);
    if input != "-" {
        report = report.with_source_path(input);
    }
    let rendered = report.render(format)?;

    match out {
        Some(path) => {
            std::fs::write(&path, &rendered)?;
            eprintln!(
                "✅ {} words ({} format) saved to: {}",
                report.summary_words,
                format,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn draw_progress(event: &ProgressEvent) {
    debug!("Progress {}% ({})", event.percent, event.stage);
    let mut stderr = std::io::stderr().lock();
    // Write errors on a closed stderr are ignored
    let _ = write!(
        stderr,
        "\r{} {:<40}",
        progress_bar(event.percent, BAR_WIDTH),
        event.stage.to_string()
    );
    let _ = stderr.flush();
}

fn progress_bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100);
    let filled = percent as usize * width / 100;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {:>3}%",
        "█".repeat(filled),
        "░".repeat(empty),
        percent
    )
}
