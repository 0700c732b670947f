//! Precis CLI - summarize long documents at a chosen level of detail
//!
//! Documents are split into chunks, each chunk is summarized by a hosted
//! language model, and the partial summaries are merged into one.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use precis_core::{Config, ReportFormat, SummaryLevel};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Precis - map-reduce document summarizer
#[derive(Parser)]
#[command(name = "precis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true, env = "PRECIS_MODEL")]
    model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PRECIS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize a PDF or text file ("-" reads stdin)
    Summarize {
        /// Input file, or "-" for stdin
        input: String,

        /// Level of detail: concise, balanced or comprehensive
        #[arg(short, long)]
        level: Option<SummaryLevel>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check a document and show its chunk plan without calling the model
    Inspect {
        /// Input file, or "-" for stdin
        input: String,

        /// Level of detail used for the budget preview
        #[arg(short, long)]
        level: Option<SummaryLevel>,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Markdown => ReportFormat::Markdown,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_file(path)?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => Config::load()?,
    };

    if let Some(model) = &cli.model {
        config.completion.model = model.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config.logging.level);

    match cli.command {
        Commands::Summarize {
            input,
            level,
            format,
            out,
        } => commands::summarize::run(config, input, level, format.into(), out).await,
        Commands::Inspect { input, level } => commands::inspect::run(config, input, level),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(config),
            ConfigCommands::Init { force } => commands::config::init(force),
        },
    }
}
