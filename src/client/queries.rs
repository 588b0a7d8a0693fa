//! Registry of in-flight client calls, so logout can cancel them all.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

struct Inner {
    /// Bumped by every `cancel_all`. A call is cancelled once the epoch
    /// moves past the one it started in.
    epoch: watch::Sender<u64>,
    in_flight: AtomicUsize,
}

#[derive(Clone)]
pub struct QueryRegistry {
    inner: Arc<Inner>,
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                epoch: watch::Sender::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a call. The guard unregisters it when dropped.
    pub fn track(&self) -> QueryGuard {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let rx = self.inner.epoch.subscribe();
        let started = *rx.borrow();
        QueryGuard {
            inner: self.inner.clone(),
            rx,
            started,
        }
    }

    /// Cancel every call currently tracked.
    pub fn cancel_all(&self) {
        self.inner.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Number of `cancel_all` calls so far.
    pub fn epoch(&self) -> u64 {
        *self.inner.epoch.borrow()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

pub struct QueryGuard {
    inner: Arc<Inner>,
    rx: watch::Receiver<u64>,
    started: u64,
}

impl QueryGuard {
    /// Resolves once the registry cancels this call.
    pub async fn cancelled(&mut self) {
        let started = self.started;
        if self.rx.wait_for(|epoch| *epoch != started).await.is_err() {
            // The sender lives in `inner`, which this guard keeps alive.
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_all_wakes_tracked_calls() {
        let registry = QueryRegistry::new();
        let mut guard = registry.track();
        assert_eq!(registry.in_flight(), 1);

        let waiter = tokio::spawn(async move {
            guard.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.cancel_all();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(registry.in_flight(), 0);
        assert_eq!(registry.epoch(), 1);
    }

    #[tokio::test]
    async fn test_calls_started_after_cancel_are_not_cancelled() {
        let registry = QueryRegistry::new();
        registry.cancel_all();
        let mut guard = registry.track();
        let result =
            tokio::time::timeout(Duration::from_millis(50), guard.cancelled()).await;
        assert!(result.is_err());
    }
}
