//! Ingest command - push JSON lines through the buffered writer

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use silt_config::Config;
use silt_ingest::{BufferedWriter, IngestEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::Components;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// File with one event per line, or `-` for stdin
    pub input: PathBuf,

    /// Provenance reference stored with every event
    #[arg(long)]
    pub source_token: Option<String>,
}

pub async fn run(args: IngestArgs, config: Config) -> Result<()> {
    let components = Components::open(&config).await?;
    let writer = BufferedWriter::new(Arc::clone(&components.store), &config.ingest);

    let token = args.source_token.as_deref();
    let lines = if args.input.as_os_str() == "-" {
        write_lines(&writer, BufReader::new(tokio::io::stdin()), token).await?
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("failed to open {}", args.input.display()))?;
        write_lines(&writer, BufReader::new(file), token).await?
    };

    writer.close().await;
    components.store.close().await;

    let metrics = writer.metrics();
    println!(
        "read {} lines: {} stored, {} wrapped as plain text, {} evicted",
        lines, metrics.flushed, metrics.malformed_wrapped, metrics.evicted
    );
    if writer.buffered_len() > 0 {
        anyhow::bail!("{} events could not be stored", writer.buffered_len());
    }
    Ok(())
}

/// Feed non-empty lines into the writer, returning how many were read
async fn write_lines<R>(
    writer: &BufferedWriter,
    reader: R,
    source_token: Option<&str>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        let mut event = IngestEvent::from(line);
        if let Some(token) = source_token {
            event = event.with_source_token(token);
        }
        writer.write(event).await;
        count += 1;
    }

    Ok(count)
}
