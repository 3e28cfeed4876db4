//! Cancellation-aware waiting for the long running loops

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;

/// Sleep for `duration`; returns `false` if cancelled first
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return !token.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Race `future` against cancellation
pub async fn with_cancel<F, T, E>(token: &CancellationToken, future: F) -> Result<T, ListenerError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ListenerError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ListenerError::Cancelled),
        result = future => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_or_cancel(&token, Duration::from_secs(3600)).await);
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(&token, Duration::from_millis(1)).await);
        assert!(sleep_or_cancel(&token, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_with_cancel_stops_pending_call() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), _> =
            with_cancel(&token, std::future::pending::<Result<(), NodeError>>()).await;
        assert!(matches!(result, Err(ListenerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_with_cancel_passes_errors_through() {
        let token = CancellationToken::new();
        let result: Result<(), _> =
            with_cancel(&token, async { Err(NodeError::NotFound("block 5".into())) }).await;
        assert!(result.unwrap_err().is_not_found());
    }
}
