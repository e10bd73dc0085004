//! Cooperative stop signal shared by the worker tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable stop flag with an awaitable edge.
///
/// Workers check [`StopSignal::is_stopped`] at loop tops and race
/// [`StopSignal::cancelled`] against their suspension points (watcher poll,
/// send await, retry sleep) so a stop interrupts them promptly.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Request stop; wakes every task parked in [`StopSignal::cancelled`].
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolve once stop has been requested.
    pub async fn cancelled(&self) {
        let mut notified = Box::pin(self.inner.notify.notified());
        loop {
            if self.is_stopped() {
                return;
            }
            notified.as_mut().await;
            notified = Box::pin(self.inner.notify.notified());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_wakes_waiters() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        signal.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_after_stop() {
        let signal = StopSignal::new();
        signal.stop();
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("already stopped");
    }
}
