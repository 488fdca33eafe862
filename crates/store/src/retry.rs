//! Fresh-attempt retry for transient store failures

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Attempts made before a transient error is surfaced
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// First backoff delay (doubles each retry)
const BASE_DELAY: Duration = Duration::from_millis(25);

/// Upper bound on a single backoff delay
const MAX_DELAY: Duration = Duration::from_millis(500);

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// Each attempt must be a complete transaction so a retry never observes
/// partial state from the previous one.
pub async fn with_retry<T, F, Fut>(operation: &'static str, attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    let mut delay = BASE_DELAY;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
