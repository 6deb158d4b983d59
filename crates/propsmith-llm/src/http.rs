//! Retry with exponential back-off for provider requests.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use tracing::warn;

const INITIAL_DELAY: Duration = Duration::from_millis(1000);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Whether a response status is worth another attempt.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before the next attempt: `Retry-After` seconds when present, else `fallback`.
pub fn retry_delay(headers: &HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .map(|d| d.min(MAX_DELAY))
        .unwrap_or(fallback)
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Run `task` up to `max_retries + 1` times.
///
/// Network errors, 429 and 5xx responses are retried. Any other response,
/// or the last one once retries are exhausted, is returned for the caller
/// to interpret.
pub async fn request_with_retry<F, Fut>(mut task: F, max_retries: u32) -> Result<reqwest::Response, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    loop {
        attempt += 1;
        match task().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || attempt > max_retries || !is_retryable(status) {
                    return Ok(response);
                }
                let wait = retry_delay(response.headers(), delay);
                warn!(
                    status = status.as_u16(),
                    attempt,
                    max_retries,
                    wait_ms = wait.as_millis() as u64,
                    "provider request failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                if attempt > max_retries {
                    return Err(err);
                }
                warn!(
                    error = %err,
                    attempt,
                    max_retries,
                    wait_ms = delay.as_millis() as u64,
                    "provider unreachable, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
        delay = next_delay(delay);
    }
}
