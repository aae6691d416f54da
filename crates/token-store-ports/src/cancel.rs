use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use token_store_core::TokenStoreError;

/// Caller-supplied deadline and cancellation signal for a repository call.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Share an existing token, e.g. one cancelled on client disconnect or shutdown.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Drive a repository future until it finishes, the context is cancelled, or
/// the deadline passes.
///
/// On cancellation the inner future is dropped, which aborts its I/O. Backend
/// writes are single statements or transactions, so a dropped write has either
/// committed in full or not at all.
pub async fn cancellable<T, F>(ctx: &OperationContext, fut: F) -> Result<T, TokenStoreError>
where
    F: Future<Output = Result<T, TokenStoreError>>,
{
    if ctx.is_cancelled() {
        return Err(TokenStoreError::Cancelled);
    }

    let deadline = async {
        match ctx.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(TokenStoreError::Cancelled),
        _ = deadline => Err(TokenStoreError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_completed_results() {
        let ctx = OperationContext::new();
        let value = cancellable(&ctx, async { Ok::<_, TokenStoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = cancellable(&ctx, async {
            Err::<(), _>(TokenStoreError::Storage("boom".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, TokenStoreError::Storage("boom".into()));
    }

    #[tokio::test]
    async fn already_cancelled_context_never_polls_the_future() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OperationContext::new().with_cancellation(token);

        let polled = std::sync::atomic::AtomicBool::new(false);
        let err = cancellable(&ctx, async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok::<(), TokenStoreError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, TokenStoreError::Cancelled);
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelling_mid_flight_returns_cancelled() {
        let ctx = OperationContext::new();
        let handle = ctx.cancellation_token().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let err = cancellable(&ctx, async {
            std::future::pending::<()>().await;
            Ok::<(), TokenStoreError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, TokenStoreError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_returns_cancelled() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(5));

        let err = cancellable(&ctx, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), TokenStoreError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, TokenStoreError::Cancelled);
    }
}
