//! Retry and backoff for logical requests.
//!
//! - GET: up to `max_retries + 1` attempts back to back, each bounded by its
//!   own attempt timeout. Only a timeout is retried.
//! - PUT: same attempt bound, with an exponential pause between attempts
//!   (starting at the attempt timeout, doubling, capped at 30 s). A timeout,
//!   or an error whose text mentions one, is retried; a remote rejection is not.
//!
//! Failures are wrapped in [`NefitError::RequestFailed`] with the number of
//! attempts actually made.

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::context::CallContext;
use crate::error::{NefitError, Result};
use crate::protocol::RequestMethod;

/// Upper bound for the PUT backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Attempt bounds and timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt deadline, also the initial PUT backoff.
    pub attempt_timeout: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy from client configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: config.retry_timeout,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// Total attempts allowed.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run a GET with retry on timeout.
///
/// `attempt` receives a context carrying the per-attempt deadline.
pub async fn get_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    uri: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(CallContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        if attempts > 1 {
            tracing::debug!(uri = %uri, attempt = attempts, "retrying GET request");
        }

        let err = match attempt(ctx.with_timeout(policy.attempt_timeout)).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if ctx.err().is_some() || !err.is_timeout() || attempts >= policy.max_attempts() {
            return Err(NefitError::RequestFailed {
                method: RequestMethod::Get,
                uri: uri.to_string(),
                attempts,
                source: Box::new(err),
            });
        }
    }
}

/// Run a PUT with exponential backoff.
pub async fn put_with_retry<F, Fut>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    uri: &str,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(CallContext) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut backoff = policy.attempt_timeout;
    let mut attempts = 0;
    let mut last_err: Option<NefitError> = None;

    loop {
        if let Some(err) = last_err.take() {
            tracing::debug!(
                uri = %uri,
                attempt = attempts + 1,
                backoff = ?backoff,
                error = %err,
                "retrying PUT request"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                cancelled = ctx.done() => {
                    return Err(NefitError::RequestFailed {
                        method: RequestMethod::Put,
                        uri: uri.to_string(),
                        attempts,
                        source: Box::new(cancelled),
                    });
                }
            }

            backoff = (backoff * 2).min(policy.max_backoff);
        }

        attempts += 1;
        let err = match attempt(ctx.with_timeout(policy.attempt_timeout)).await {
            Ok(()) => {
                if attempts > 1 {
                    tracing::info!(uri = %uri, attempts, "PUT request succeeded after retry");
                }
                return Ok(());
            }
            Err(e) => e,
        };

        let retryable = err.is_put_retryable();
        if !retryable {
            tracing::warn!(uri = %uri, error = %err, "PUT request failed with non-retryable error");
        }

        if ctx.err().is_some() || !retryable || attempts >= policy.max_attempts() {
            return Err(NefitError::RequestFailed {
                method: RequestMethod::Put,
                uri: uri.to_string(),
                attempts,
                source: Box::new(err),
            });
        }

        last_err = Some(err);
    }
}
