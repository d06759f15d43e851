//! Call context for public operations.
//!
//! Every public client operation takes a [`CallContext`]: a cancellation
//! token plus an optional deadline. Retry attempts derive child contexts with
//! their own sub-deadline; cancelling a parent cancels all of its children.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use nefit_client::CallContext;
//!
//! let ctx = CallContext::new().with_timeout(Duration::from_secs(10));
//! let payload = client.get(&ctx, "/system/appliance/systemPressure").await?;
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::NefitError;

/// Cancellation signal and optional deadline for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Cancelled by the caller (or by a parent context).
    token: CancellationToken,
    /// Absolute deadline, if any.
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that never expires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child context that also expires after `timeout`.
    ///
    /// The child keeps the earlier of the two deadlines.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all contexts derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Get the deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Get the underlying cancellation token.
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Current state: `None` while live, otherwise the reason it ended.
    pub fn err(&self) -> Option<NefitError> {
        if self.token.is_cancelled() {
            return Some(NefitError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(NefitError::Timeout),
            _ => None,
        }
    }

    /// Wait until the context ends and return why.
    ///
    /// Yields [`NefitError::Cancelled`] or [`NefitError::Timeout`]. Safe to
    /// use as a `select!` branch.
    pub async fn done(&self) -> NefitError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => NefitError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => NefitError::Timeout,
            },
            None => {
                self.token.cancelled().await;
                NefitError::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_live() {
        let ctx = CallContext::new();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = CallContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));

        parent.cancel();
        assert!(matches!(child.err(), Some(NefitError::Cancelled)));
        assert!(matches!(parent.err(), Some(NefitError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_affect_parent() {
        let parent = CallContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));

        child.cancel();
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = CallContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(100));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_reports_timeout() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx.done().await;
        assert!(err.is_timeout());
        assert!(matches!(ctx.err(), Some(NefitError::Timeout)));
    }

    #[tokio::test]
    async fn test_done_reports_cancel() {
        let ctx = CallContext::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });

        ctx.cancel();
        let err = task.await.unwrap();
        assert!(matches!(err, NefitError::Cancelled));
    }

    #[test]
    fn test_with_token() {
        let token = CancellationToken::new();
        let ctx = CallContext::with_token(token.clone());
        token.cancel();
        assert!(matches!(ctx.err(), Some(NefitError::Cancelled)));
    }
}
