//! Periodic eviction of old read notifications.

use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::center::NotificationCenter;

/// Default period between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default age after which read notifications are evicted.
pub const DEFAULT_RETENTION_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Evicts read notifications older than the retention horizon on a timer.
///
/// Unread notifications are never evicted, whatever their age. The sweeper
/// runs independently of the hub connection.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    center: NotificationCenter,
    interval: Duration,
    horizon: Duration,
}

impl RetentionSweeper {
    pub fn new(center: NotificationCenter) -> Self {
        Self {
            center,
            interval: DEFAULT_SWEEP_INTERVAL,
            horizon: DEFAULT_RETENTION_HORIZON,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    /// Run one eviction pass now.
    pub fn sweep(&self) -> usize {
        let horizon = match chrono::Duration::from_std(self.horizon) {
            Ok(horizon) => horizon,
            Err(e) => {
                warn!("Retention horizon out of range, skipping sweep: {}", e);
                return 0;
            }
        };
        self.center.evict_read_older_than(Utc::now() - horizon)
    }

    /// Start the sweep loop. The first pass runs one interval after start.
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(
                interval = ?self.interval,
                horizon = ?self.horizon,
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Retention sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        let removed = self.sweep();
                        debug!(removed, "Retention sweep finished");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewNotification, NotificationType};

    fn seed(center: &NotificationCenter) {
        let old = Utc::now() - chrono::Duration::hours(25);
        let info = |id: &str| NewNotification::new(NotificationType::Info, "t", "m").with_id(id);
        center.add(info("old-read").with_created_at(old));
        center.add(info("old-unread").with_created_at(old));
        center.add(info("fresh-read"));
        center.mark_as_read("old-read");
        center.mark_as_read("fresh-read");
    }

    #[test]
    fn test_sweep_is_selective() {
        let center = NotificationCenter::default();
        seed(&center);

        let removed = RetentionSweeper::new(center.clone()).sweep();

        assert_eq!(removed, 1);
        assert!(center.get("old-read").is_none());
        assert!(center.get("old-unread").is_some());
        assert!(center.get("fresh-read").is_some());
        assert_eq!(center.unread_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_interval_until_cancelled() {
        let center = NotificationCenter::default();
        seed(&center);
        let cancel = CancellationToken::new();

        let handle = RetentionSweeper::new(center.clone()).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert!(center.get("old-read").is_some());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert!(center.get("old-read").is_none());
        assert_eq!(center.len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
