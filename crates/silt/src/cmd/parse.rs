//! Parse command - drain the raw-event queue once

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use silt_config::Config;
use silt_worker::ParseWorker;

use super::Components;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Stop after this many claim passes
    #[arg(long, default_value_t = 1000)]
    pub max_passes: usize,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ParseArgs, config: Config) -> Result<()> {
    let components = Components::open(&config).await?;
    let worker = ParseWorker::new(
        Arc::clone(&components.store),
        Arc::clone(&components.registry),
        config.worker.claim_batch_size,
    );

    let report = worker.drain(args.max_passes).await.context("parse failed")?;
    let pending = components.store.pending_count().await?;
    components.store.close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "claimed {}, parsed {}, malformed {}, fields tracked {}, still pending {}",
            report.claimed, report.parsed, report.malformed, report.fields_tracked, pending
        );
    }
    Ok(())
}
