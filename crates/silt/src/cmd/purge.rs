//! Purge command - delete raw events and records past retention

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use humantime_serde::re::humantime;
use silt_config::Config;

use super::Components;

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Age cutoff such as `30d` or `12h` (defaults to scheduler.retention)
    #[arg(long)]
    pub older_than: Option<String>,
}

pub async fn run(args: PurgeArgs, config: Config) -> Result<()> {
    let age = match args.older_than.as_deref() {
        Some(text) => parse_age(text)?,
        None => config.scheduler.retention,
    };
    let cutoff = Utc::now()
        - chrono::Duration::from_std(age).context("retention age out of range")?;

    let components = Components::open(&config).await?;
    let report = components.store.purge_before(cutoff).await?;
    components.store.close().await;

    println!(
        "purged {} raw events and {} records older than {}",
        report.raw_events,
        report.records,
        humantime::format_duration(age)
    );
    Ok(())
}

fn parse_age(text: &str) -> Result<Duration> {
    humantime::parse_duration(text).with_context(|| format!("invalid duration '{}'", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("7d").unwrap(), Duration::from_secs(7 * 86_400));
        assert_eq!(parse_age("90m").unwrap(), Duration::from_secs(5_400));
        assert!(parse_age("soon").is_err());
    }
}
