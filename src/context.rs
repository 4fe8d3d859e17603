//! Per-call cancellation and deadline.
//!
//! Every provider entry point receives a [`Context`]. All I/O (identity
//! provider calls, token refresh, GraphQL requests, post-delete
//! quiescence) runs through [`Context::run`] or [`Context::quiesce`], so a
//! cancelled or expired call surfaces [`ProviderError::Cancelled`] promptly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

/// Cancellation signal plus optional deadline for one provider call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    /// Set (or tighten) the deadline.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context cancelled along with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast if the context is already cancelled or expired.
    pub fn check(&self, what: &str) -> Result<(), ProviderError> {
        if self.token.is_cancelled() {
            return Err(ProviderError::Cancelled(format!("{} cancelled", what)));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ProviderError::Cancelled(format!("{} exceeded its deadline", what)));
        }
        Ok(())
    }

    /// Run `fut` until it completes, the context is cancelled, or the
    /// deadline passes. The future is dropped on cancellation.
    pub async fn run<F, T>(&self, what: &str, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(ProviderError::Cancelled(format!("{} cancelled", what)))
            }
            _ = expired => {
                Err(ProviderError::Cancelled(format!("{} exceeded its deadline", what)))
            }
            result = fut => result,
        }
    }

    /// Wait for `interval`, cut short by the deadline.
    ///
    /// Reaching the deadline ends the wait successfully: the interval is an
    /// upper bound on settling time, not a requirement. Cancellation fails.
    pub async fn quiesce(&self, interval: Duration) -> Result<(), ProviderError> {
        if interval.is_zero() {
            return Ok(());
        }
        let target = Instant::now() + interval;
        let until = match self.deadline {
            Some(deadline) if deadline < target => {
                debug!(
                    requested_ms = interval.as_millis() as u64,
                    "Quiescence interval truncated by deadline"
                );
                deadline
            },
            _ => target,
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(ProviderError::Cancelled("post-delete quiescence cancelled".to_string()))
            }
            _ = tokio::time::sleep_until(until) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready_err, task};

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new();
        let value = assert_ok!(ctx.run("noop", async { Ok::<_, ProviderError>(7) }).await);
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let ctx = Context::new();
        ctx.cancel();
        let err = assert_err!(
            ctx.run("GetKmsKey", std::future::pending::<Result<(), ProviderError>>())
                .await
        );
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert!(err.message().contains("GetKmsKey"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline() {
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ProviderError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(child.check("child").is_err());

        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiesce_full_interval() {
        let ctx = Context::new();
        let start = Instant::now();
        ctx.quiesce(Duration::from_secs(10)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiesce_bounded_by_deadline() {
        let ctx = Context::with_timeout(Duration::from_secs(3));
        let start = Instant::now();
        ctx.quiesce(Duration::from_secs(10)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiesce_cancelled() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let err = ctx.quiesce(Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiesce_pending_until_cancelled() {
        let ctx = Context::new();
        let mut wait = task::spawn(ctx.quiesce(Duration::from_secs(10)));
        assert_pending!(wait.poll());

        ctx.cancel();
        assert!(wait.is_woken());
        let err = assert_ready_err!(wait.poll());
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }

    #[test]
    fn test_deadline_only_tightens() {
        let now = Instant::now();
        let ctx = Context::new()
            .deadline_at(now + Duration::from_secs(5))
            .deadline_at(now + Duration::from_secs(50));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }
}
