//! Scheduler cadence configuration

use std::time::Duration;

use serde::Deserialize;

/// Scheduler configuration
///
/// # Example
///
/// ```toml
/// [scheduler]
/// parse_interval = "2s"
/// cleanup_interval = "5m"
/// daily_hour = 3
/// daily_poll_interval = "5m"
/// stop_grace = "10s"
/// stale_claim_after = "15m"
/// retention = "30d"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between parse passes
    /// Default: 2s
    #[serde(with = "humantime_serde")]
    pub parse_interval: Duration,

    /// Sleep between cleanup passes (cache eviction, stale claims)
    /// Default: 5m
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// UTC hour-of-day at which daily jobs run (0-23)
    /// Default: 3
    pub daily_hour: u32,

    /// How often the daily loop checks the wall clock
    /// Default: 5m
    #[serde(with = "humantime_serde")]
    pub daily_poll_interval: Duration,

    /// How long `stop()` waits for each loop before aborting it
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,

    /// Claimed-but-unfinished events older than this are released
    /// Default: 15m
    #[serde(with = "humantime_serde")]
    pub stale_claim_after: Duration,

    /// Age after which raw events and records are purged
    /// Default: 30d
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parse_interval: Duration::from_secs(2),
            cleanup_interval: Duration::from_secs(300),
            daily_hour: 3,
            daily_poll_interval: Duration::from_secs(300),
            stop_grace: Duration::from_secs(10),
            stale_claim_after: Duration::from_secs(900),
            retention: Duration::from_secs(30 * 86_400),
        }
    }
}
