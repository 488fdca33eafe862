//! Silt - structured log ingestion with adaptive schema tracking
//!
//! # Usage
//!
//! ```bash
//! # Run the writer and background scheduler until Ctrl-C
//! silt serve --config silt.toml
//!
//! # Load JSON lines, parse them, inspect dynamic fields
//! silt ingest app.log
//! silt parse
//! silt fields --threshold 100
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use silt_config::LogFormat;
use silt_ingest::IngestLayer;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Silt - structured log ingestion with adaptive schema tracking
#[derive(Parser, Debug)]
#[command(name = "silt")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingest writer and background scheduler
    Serve(cmd::serve::ServeArgs),

    /// Write JSON lines from a file or stdin into the raw store
    Ingest(cmd::ingest::IngestArgs),

    /// Run parse passes until the queue is drained
    Parse(cmd::parse::ParseArgs),

    /// Show dynamic field statistics and promotion candidates
    Fields(cmd::fields::FieldsArgs),

    /// Mark high-priority fields as promoted
    Promote(cmd::promote::PromoteArgs),

    /// Delete raw events and records past retention
    Purge(cmd::purge::PurgeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref())?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.directive());

    match cli.command {
        // serve installs logging itself so it can attach the capture layer
        Command::Serve(args) => cmd::serve::run(args, config, &log_level).await,
        Command::Ingest(args) => {
            init_logging(&log_level, config.log.format, None)?;
            cmd::ingest::run(args, config).await
        }
        Command::Parse(args) => {
            init_logging(&log_level, config.log.format, None)?;
            cmd::parse::run(args, config).await
        }
        Command::Fields(args) => {
            init_logging(&log_level, config.log.format, None)?;
            cmd::fields::run(args, config).await
        }
        Command::Promote(args) => {
            init_logging(&log_level, config.log.format, None)?;
            cmd::promote::run(args, config).await
        }
        Command::Purge(args) => {
            init_logging(&log_level, config.log.format, None)?;
            cmd::purge::run(args, config).await
        }
    }
}

/// Initialize the tracing subscriber, optionally feeding events into a writer
pub(crate) fn init_logging(
    level: &str,
    format: LogFormat,
    capture: Option<IngestLayer>,
) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let output = match format {
        LogFormat::Console => fmt::layer().with_target(true).with_thread_ids(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(capture)
        .with(filter)
        .init();

    Ok(())
}
