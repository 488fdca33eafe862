//! Serve command - writer plus background scheduler until shutdown

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use silt_config::Config;
use silt_ingest::{BufferedWriter, IngestLayer};
use silt_worker::{ParseWorker, standard_scheduler};
use tokio::signal;
use tracing::info;

use super::Components;
use crate::init_logging;

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Also store this process's own log events (core targets excluded)
    #[arg(long)]
    pub capture_logs: bool,

    /// `app` value stamped on captured log events
    #[arg(long, default_value = "silt")]
    pub app: String,
}

pub async fn run(args: ServeArgs, config: Config, log_level: &str) -> Result<()> {
    let components = Components::open(&config).await?;
    let writer = Arc::new(BufferedWriter::new(
        Arc::clone(&components.store),
        &config.ingest,
    ));

    let capture = args
        .capture_logs
        .then(|| IngestLayer::new(Arc::clone(&writer)).with_app(&args.app));
    init_logging(log_level, config.log.format, capture)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = components.store.name(),
        skip_locked = components.store.supports_skip_locked(),
        capture_logs = args.capture_logs,
        "silt starting"
    );

    let worker = Arc::new(ParseWorker::new(
        Arc::clone(&components.store),
        Arc::clone(&components.registry),
        config.worker.claim_batch_size,
    ));
    let scheduler = standard_scheduler(
        &config.scheduler,
        Arc::clone(&components.store),
        Arc::clone(&components.registry),
        worker,
    );
    scheduler.start();

    wait_for_shutdown().await;
    info!("shutdown requested");

    let report = scheduler.stop().await;
    writer.close().await;
    components.store.close().await;

    let metrics = writer.metrics();
    info!(
        loops_exited = report.exited,
        loops_aborted = report.aborted.len(),
        events_flushed = metrics.flushed,
        "silt shutdown complete"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
