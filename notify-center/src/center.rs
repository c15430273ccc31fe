//! Session-scoped notification context.
//!
//! [`NotificationCenter`] wraps the store behind a lock, tracks the hub's
//! connection state and broadcasts every effective change to presentation
//! surfaces. It is cheap to clone; all clones share the same state.

use chrono::{DateTime, Utc};
use hub_client::ConnectionState;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::model::{NewNotification, NotificationRecord};
use crate::store::NotificationStore;

/// Broadcast capacity for store changes.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// An effective change to the center's state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreChange {
    Added { notification: NotificationRecord },
    Read { id: String },
    AllRead { count: usize },
    ToastHidden { id: String },
    Removed { id: String },
    Cleared { count: usize },
    Swept { count: usize },
    ConnectionState { state: ConnectionState },
}

/// Read-only projection for presentation surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    /// Newest first.
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
    pub connection_state: ConnectionState,
}

struct CenterInner {
    store: RwLock<NotificationStore>,
    connection_state: watch::Sender<ConnectionState>,
    changes: broadcast::Sender<StoreChange>,
}

#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(CenterInner {
                store: RwLock::new(NotificationStore::new(capacity)),
                connection_state,
                changes,
            }),
        }
    }

    /// Subscribe to effective changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    /// Observe the hub connection state.
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let store = self.inner.store.read();
        NotificationSnapshot {
            notifications: store.to_vec(),
            unread_count: store.unread_count(),
            connection_state: self.connection_state(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.inner.store.read().unread_count()
    }

    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.inner.store.read().get(id).cloned()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.inner.connection_state.send_replace(state);
        if previous != state {
            self.publish(StoreChange::ConnectionState { state });
        }
    }

    /// Insert a notification. `None` if its id is already stored.
    pub fn add(&self, new: NewNotification) -> Option<NotificationRecord> {
        let record = self.inner.store.write().add(new)?;
        debug!(id = %record.id, kind = %record.notification_type, "Notification added");
        self.publish(StoreChange::Added {
            notification: record.clone(),
        });
        Some(record)
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        let changed = self.inner.store.write().mark_read(id);
        if changed {
            self.publish(StoreChange::Read { id: id.to_string() });
        }
        changed
    }

    pub fn mark_all_as_read(&self) -> usize {
        let count = self.inner.store.write().mark_all_read();
        if count > 0 {
            self.publish(StoreChange::AllRead { count });
        }
        count
    }

    pub fn hide_toast(&self, id: &str) -> bool {
        let changed = self.inner.store.write().hide_toast(id);
        if changed {
            self.publish(StoreChange::ToastHidden { id: id.to_string() });
        }
        changed
    }

    pub fn clear_notification(&self, id: &str) -> bool {
        let removed = self.inner.store.write().remove(id).is_some();
        if removed {
            self.publish(StoreChange::Removed { id: id.to_string() });
        }
        removed
    }

    pub fn clear_all_notifications(&self) -> usize {
        let count = self.inner.store.write().clear_all();
        if count > 0 {
            self.publish(StoreChange::Cleared { count });
        }
        count
    }

    /// Evict read notifications created before `cutoff`.
    pub fn evict_read_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let count = self.inner.store.write().evict_read_older_than(cutoff);
        if count > 0 {
            info!(count, %cutoff, "Evicted read notifications");
            self.publish(StoreChange::Swept { count });
        }
        count
    }

    pub fn check_consistency(&self) -> bool {
        self.inner.store.read().check_consistency()
    }

    fn publish(&self, change: StoreChange) {
        // No subscribers is fine.
        let _ = self.inner.changes.send(change);
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(crate::store::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.inner.store.read();
        f.debug_struct("NotificationCenter")
            .field("len", &store.len())
            .field("unread_count", &store.unread_count())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationType;

    fn note(id: &str) -> NewNotification {
        NewNotification::new(NotificationType::Info, "t", "m").with_id(id)
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let center = NotificationCenter::default();
        let mut rx = center.subscribe();

        center.add(note("n1"));
        center.hide_toast("n1");
        center.mark_as_read("n1");
        center.clear_notification("n1");

        assert!(matches!(rx.recv().await.unwrap(), StoreChange::Added { notification } if notification.id == "n1"));
        assert!(matches!(rx.recv().await.unwrap(), StoreChange::ToastHidden { id } if id == "n1"));
        assert!(matches!(rx.recv().await.unwrap(), StoreChange::Read { id } if id == "n1"));
        assert!(matches!(rx.recv().await.unwrap(), StoreChange::Removed { id } if id == "n1"));
    }

    #[tokio::test]
    async fn test_noop_intents_are_silent() {
        let center = NotificationCenter::default();
        let mut rx = center.subscribe();

        assert!(!center.mark_as_read("missing"));
        assert!(!center.clear_notification("missing"));
        assert_eq!(center.mark_all_as_read(), 0);
        assert_eq!(center.clear_all_notifications(), 0);

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_snapshot() {
        let center = NotificationCenter::new(10);
        center.add(note("a"));
        center.add(note("b"));
        center.mark_as_read("a");
        center.set_connection_state(ConnectionState::Connected);

        let snapshot = center.snapshot();
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.notifications[0].id, "b");
        assert_eq!(snapshot.unread_count, 1);
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["unreadCount"], 1);
        assert_eq!(json["connectionState"], "connected");
    }

    #[test]
    fn test_clones_share_state() {
        let center = NotificationCenter::default();
        let other = center.clone();
        center.add(note("a"));
        assert_eq!(other.unread_count(), 1);
        assert!(other.check_consistency());
    }
}
