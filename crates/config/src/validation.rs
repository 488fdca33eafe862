//! Configuration validation
//!
//! Validates config consistency:
//! - Store URL maps to a known backend
//! - Batch sizes and capacities are non-zero and consistent
//! - Eager-flush levels are real severities
//! - Scheduler cadences are non-zero and the daily hour exists
//! - Promotion cutoff sits on the 0-100 priority scale

use std::time::Duration;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Severity names accepted in `eager_flush_levels`
const KNOWN_LEVELS: &[&str] = &["debug", "info", "warn", "error", "fatal", "unknown"];

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_store(config)?;
    validate_ingest(config)?;
    validate_worker(config)?;
    validate_schema(config)?;
    validate_scheduler(config)?;
    Ok(())
}

fn validate_store(config: &Config) -> Result<()> {
    if config.store.url.trim().is_empty() {
        return Err(ConfigError::invalid_value("store", "url", "must not be empty"));
    }
    config.store.backend()?;

    if config.store.max_connections == 0 {
        return Err(ConfigError::invalid_value(
            "store",
            "max_connections",
            "must be at least 1",
        ));
    }

    Ok(())
}

fn validate_ingest(config: &Config) -> Result<()> {
    let ingest = &config.ingest;

    if ingest.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "ingest",
            "batch_size",
            "must be at least 1",
        ));
    }

    if ingest.capacity < ingest.batch_size {
        return Err(ConfigError::invalid_value(
            "ingest",
            "capacity",
            format!(
                "must be >= batch_size ({} < {})",
                ingest.capacity, ingest.batch_size
            ),
        ));
    }

    non_zero("ingest", "flush_interval", ingest.flush_interval)?;

    for level in &ingest.eager_flush_levels {
        if !KNOWN_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "ingest",
                "eager_flush_levels",
                format!("unknown severity '{}'", level),
            ));
        }
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<()> {
    if config.worker.claim_batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "worker",
            "claim_batch_size",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_schema(config: &Config) -> Result<()> {
    let schema = &config.schema;

    if !(0.0..=100.0).contains(&schema.auto_promote_cutoff) {
        return Err(ConfigError::invalid_value(
            "schema",
            "auto_promote_cutoff",
            "must be between 0 and 100",
        ));
    }

    non_zero("schema", "recency_window", schema.recency_window)?;
    non_zero("schema", "cache_ttl", schema.cache_ttl)?;
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<()> {
    let scheduler = &config.scheduler;

    non_zero("scheduler", "parse_interval", scheduler.parse_interval)?;
    non_zero("scheduler", "cleanup_interval", scheduler.cleanup_interval)?;
    non_zero("scheduler", "daily_poll_interval", scheduler.daily_poll_interval)?;
    non_zero("scheduler", "stop_grace", scheduler.stop_grace)?;
    non_zero("scheduler", "stale_claim_after", scheduler.stale_claim_after)?;
    non_zero("scheduler", "retention", scheduler.retention)?;

    if scheduler.daily_hour > 23 {
        return Err(ConfigError::invalid_value(
            "scheduler",
            "daily_hour",
            format!("must be 0..=23, got {}", scheduler.daily_hour),
        ));
    }

    // A poll slower than an hour can step over the daily hour entirely
    if scheduler.daily_poll_interval > Duration::from_secs(3600) {
        return Err(ConfigError::invalid_value(
            "scheduler",
            "daily_poll_interval",
            "must not exceed 1h",
        ));
    }

    Ok(())
}

fn non_zero(section: &'static str, field: &'static str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid_value(section, field, "must be greater than zero"));
    }
    Ok(())
}
