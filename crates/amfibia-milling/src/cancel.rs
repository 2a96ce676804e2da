//! Cooperative cancellation for runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Longest uninterrupted sleep; cancellation is noticed at least this often.
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<Inner>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new run.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Sleep for `duration` in slices of at most [`CANCEL_CHECK_INTERVAL`].
    ///
    /// Returns `false` as soon as cancellation is seen, `true` when the
    /// full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(CANCEL_CHECK_INTERVAL);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let flag = CancellationFlag::new();
        let start = tokio::time::Instant::now();
        assert!(flag.sleep(Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted() {
        let flag = CancellationFlag::new();
        let canceller = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!flag.sleep(Duration::from_secs(600)).await);
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(flag.is_cancelled());

        flag.reset();
        assert!(!flag.is_cancelled());
    }
}
