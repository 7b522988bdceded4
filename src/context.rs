//! Per-call deadline and cancellation
//!
//! Every façade operation takes a [`RequestContext`]. The context is checked
//! on entry and raced against the backend future so an expired caller gets
//! `DeadlineExceeded` or `Canceled` instead of waiting on the store.

use crate::error::{ShortenerError, ShortenerResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation carried by a single request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// Context with no deadline that is only cancelled explicitly
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Child context sharing this deadline, cancelled together with the parent
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> ShortenerResult<()> {
        if self.is_cancelled() {
            return Err(ShortenerError::Canceled);
        }
        if self.is_expired() {
            return Err(ShortenerError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The error describing why the context is done
    pub fn err(&self) -> ShortenerError {
        if self.is_cancelled() {
            ShortenerError::Canceled
        } else {
            ShortenerError::DeadlineExceeded
        }
    }

    /// Run `fut` unless the context finishes first
    pub async fn run<T, F>(&self, fut: F) -> ShortenerResult<T>
    where
        F: Future<Output = ShortenerResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.done() => Err(self.err()),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_expires() {
        let ctx = RequestContext::background();
        assert!(ctx.check().is_ok());
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_expired_context_fails_at_entry() {
        let ctx = RequestContext::with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        let result = ctx.run(async { Ok(()) }).await;
        assert!(matches!(result, Err(ShortenerError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_future() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let start = std::time::Instant::now();
        let result: ShortenerResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ShortenerError::DeadlineExceeded)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_child() {
        let parent = RequestContext::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(ShortenerError::Canceled)));
        assert!(matches!(child.err(), ShortenerError::Canceled));
    }
}
