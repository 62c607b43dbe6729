use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Non-retryable substrings. Checked first: an auth-shaped message wins even
/// if it also happens to contain a retryable substring (e.g. "500 -
/// unauthorized" reads as non-retryable).
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "401",
    "403",
    "invalid_api_key",
    "authentication",
    "permission",
    "unauthorized",
    "unauthenticated",
    "not_found_error",
    "permission_denied",
    "400",
    "422",
    "invalid_request",
    "invalid_argument",
    "malformed",
    "validation",
];

const RETRYABLE_PATTERNS: &[&str] = &[
    "429",
    "499",
    "500",
    "502",
    "503",
    "504",
    "529",
    "rate",
    "overloaded",
    "resource",
    "server_error",
    "connection",
    "timeout",
    "temporary",
    "eof",
    "tls handshake",
    "no such host",
    "api_connection",
];

/// Classifies an upstream error message. Intentionally string-based: none of
/// the upstream SDKs this gateway talks to expose a uniform typed error, so a
/// substring table is the only classification that generalizes across all of
/// them. Callers with a typed error (an HTTP status code, say) should prefer
/// that and fall back to this only when typed information is unavailable.
pub fn is_retryable(err: &str) -> bool {
    let lower = err.to_lowercase();
    if NON_RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_attempts: 3,
            request_timeout: Duration::from_secs(180),
        }
    }
}

impl RetryConfig {
    /// `delay(attempt) = base · 2^(attempt-1)`, attempt is 1-indexed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Sleeps for `delay`, returning early (without error) if `cancel` fires
/// first. Used between retry attempts so a cancelled call never blocks on a
/// backoff it will discard anyway.
async fn cancellable_sleep(delay: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Runs `attempt` up to `config.max_attempts` times, applying exponential
/// backoff between tries and stopping immediately on a non-retryable error or
/// on cancellation. `attempt` receives the 1-indexed attempt number so call
/// sites can tag logs/spans.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    request_id: &str,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<String>,
{
    let mut last_err: Option<E> = None;
    for n in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            break;
        }
        match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let text = e.to_string();
                let retryable = is_retryable(&text);
                debug!(request_id, attempt = n, retryable, "upstream attempt failed");
                if !retryable || n == config.max_attempts {
                    last_err = Some(e);
                    break;
                }
                cancellable_sleep(config.delay_for(n), cancel).await;
                last_err = Some(e);
            }
        }
    }
    // `last_err` is only absent when `cancel` fired before the first attempt ran.
    let err = last_err.unwrap_or_else(|| E::from("cancelled before first attempt".to_string()));
    warn!(request_id, "exhausted retries: {}", err);
    Err(err)
}
