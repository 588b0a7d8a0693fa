//! Transient global notification banner.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Shown when an error carries no usable message, or no response arrived.
pub const FALLBACK_MESSAGE: &str = "Something went wrong please try again later";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub id: u64,
    pub message: String,
}

/// One banner slot. A new banner replaces the current one; each banner
/// clears itself after the configured duration unless replaced first.
#[derive(Clone)]
pub struct Notifications {
    slot: Arc<watch::Sender<Option<Banner>>>,
    next_id: Arc<AtomicU64>,
    duration: Duration,
}

impl Notifications {
    pub fn new(duration: Duration) -> Self {
        Self {
            slot: Arc::new(watch::Sender::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
            duration,
        }
    }

    pub fn show(&self, message: impl Into<String>) {
        let banner = Banner {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: message.into(),
        };
        let id = banner.id;
        debug!(message = %banner.message, "Showing banner");
        self.slot.send_replace(Some(banner));

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slot = self.slot.clone();
        let duration = self.duration;
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            slot.send_if_modified(|current| match current {
                Some(banner) if banner.id == id => {
                    *current = None;
                    true
                }
                _ => false,
            });
        });
    }

    pub fn current(&self) -> Option<Banner> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Banner>> {
        self.slot.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_banner_clears_after_duration() {
        let notifications = Notifications::new(Duration::from_secs(5));
        notifications.show("Quota exceeded");
        assert_eq!(notifications.current().unwrap().message, "Quota exceeded");

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(notifications.current().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(notifications.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_banner_survives_older_timer() {
        let notifications = Notifications::new(Duration::from_secs(5));
        notifications.show("first");
        tokio::time::sleep(Duration::from_secs(3)).await;
        notifications.show("second");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(notifications.current().unwrap().message, "second");
    }
}
