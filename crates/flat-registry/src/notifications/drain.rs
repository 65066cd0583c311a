use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Counts detached background work so shutdown can wait for it.
///
/// Not a queue: registering work never blocks and nothing limits how many
/// units may be outstanding at once.
#[derive(Debug, Clone, Default)]
pub struct DrainTracker {
    inner: Arc<DrainInner>,
}

#[derive(Debug, Default)]
struct DrainInner {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Outcome of a bounded drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    TimedOut { outstanding: usize },
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work. The unit is released when the returned
    /// guard is dropped or [`DrainGuard::done`] is called.
    pub fn add(&self) -> DrainGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        DrainGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once no work is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before reading the counter so a release that
            // lands in between is not missed.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn wait_with_timeout(&self, grace: Duration) -> DrainOutcome {
        match tokio::time::timeout(grace, self.wait_idle()).await {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => DrainOutcome::TimedOut {
                outstanding: self.outstanding(),
            },
        }
    }
}

/// One registered unit of outstanding work.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the unit of work"]
pub struct DrainGuard {
    inner: Arc<DrainInner>,
}

impl DrainGuard {
    pub fn done(self) {
        drop(self);
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let tracker = DrainTracker::new();
        assert_eq!(
            tracker.wait_with_timeout(Duration::from_millis(10)).await,
            DrainOutcome::Drained
        );
    }

    #[tokio::test]
    async fn guards_balance_the_counter() {
        let tracker = DrainTracker::new();
        let first = tracker.add();
        let second = tracker.add();
        assert_eq!(tracker.outstanding(), 2);

        first.done();
        assert_eq!(tracker.outstanding(), 1);
        drop(second);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_with_outstanding_work() {
        let tracker = DrainTracker::new();
        let _guard = tracker.add();
        assert_eq!(
            tracker.wait_with_timeout(Duration::from_millis(20)).await,
            DrainOutcome::TimedOut { outstanding: 1 }
        );
    }

    #[tokio::test]
    async fn wait_wakes_when_last_unit_finishes() {
        let tracker = DrainTracker::new();
        let guard = tracker.add();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            guard.done();
        });

        assert_eq!(
            tracker.wait_with_timeout(Duration::from_secs(2)).await,
            DrainOutcome::Drained
        );
    }

    #[tokio::test]
    async fn guard_is_released_when_task_panics() {
        let tracker = DrainTracker::new();
        let guard = tracker.add();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("delivery blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(tracker.outstanding(), 0);
    }
}
