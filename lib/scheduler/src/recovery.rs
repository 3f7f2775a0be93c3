//! Exponential-backoff recovery timers (§4.5).

use std::future::Future;
use std::time::Duration;

/// Upper bound on a single recovery backoff interval, matching §4.5's
/// "capped at a sensible maximum, e.g. 1 hour".
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Computes `RecoveryBackoff x 2^(FailureCount-1)`, capped at
/// [`MAX_BACKOFF`].
///
/// `failure_count` is expected to be at least 1 (the count after the
/// failure that triggered recovery); 0 is treated the same as 1 to avoid
/// an underflow on the exponent.
#[must_use]
pub fn backoff_duration(base: Duration, failure_count: u32) -> Duration {
    let exponent = failure_count.saturating_sub(1).min(32);
    let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let millis = (base.as_millis() as u64).saturating_mul(multiplier);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// Spawns a one-shot timer that, after `delay`, runs `callback`. The
/// returned handle can be aborted by `Stop`/`Drain`/`UnregisterTrigger`
/// (§4.5).
pub fn spawn_retry_timer<F, Fut>(delay: Duration, callback: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        callback().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_uses_base_backoff() {
        let backoff = backoff_duration(Duration::from_secs(10), 1);
        assert_eq!(backoff, Duration::from_secs(10));
    }

    #[test]
    fn backoff_doubles_per_failure() {
        assert_eq!(backoff_duration(Duration::from_secs(10), 2), Duration::from_secs(20));
        assert_eq!(backoff_duration(Duration::from_secs(10), 3), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_capped() {
        let backoff = backoff_duration(Duration::from_secs(10), 20);
        assert_eq!(backoff, MAX_BACKOFF);
    }

    #[tokio::test]
    async fn retry_timer_fires_after_delay() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = spawn_retry_timer(Duration::from_millis(5), move || async move {
            let _ = tx.send(());
        });
        rx.await.expect("timer fired");
        handle.await.expect("task completed");
    }

    #[tokio::test]
    async fn retry_timer_is_cancellable() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = spawn_retry_timer(Duration::from_secs(3600), move || async move {
            let _ = tx.send(());
        });
        handle.abort();
        assert!(handle.await.is_err());
        assert!(rx.await.is_err());
    }
}
