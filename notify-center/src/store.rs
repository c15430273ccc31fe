//! Bounded, newest-first notification store.
//!
//! The unread counter is maintained incrementally by every mutation and must
//! always equal the number of records with `read == false`. Operations on
//! unknown ids are no-ops: ids may reference records that were already
//! evicted.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

use crate::model::{NewNotification, NotificationRecord};

/// Default number of records kept.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct NotificationStore {
    notifications: VecDeque<NotificationRecord>,
    unread_count: usize,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    /// Create an empty store. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            notifications: VecDeque::with_capacity(capacity),
            unread_count: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    /// Records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.notifications.iter()
    }

    pub fn to_vec(&self) -> Vec<NotificationRecord> {
        self.notifications.iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Unread records, newest first.
    pub fn unread(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.notifications.iter().filter(|n| !n.read)
    }

    /// Insert a new unread record at the front.
    ///
    /// Returns `None` when a record with the same id is already stored; the
    /// hub delivers at least once, so a repeat must not count twice.
    pub fn add(&mut self, new: NewNotification) -> Option<NotificationRecord> {
        let id = match new.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        if self.get(&id).is_some() {
            debug!(%id, "Ignoring duplicate notification");
            return None;
        }

        let record = NotificationRecord {
            id,
            notification_type: new.notification_type,
            title: new.title,
            message: new.message,
            created_at: new.created_at.unwrap_or_else(Utc::now),
            read: false,
            toast_dismissed: false,
            action_url: new.action_url,
            data: new.data,
            user_id: new.user_id,
            user_email: new.user_email,
            interactive: new.interactive,
        };

        self.notifications.push_front(record.clone());
        self.unread_count += 1;

        while self.notifications.len() > self.capacity {
            if let Some(evicted) = self.notifications.pop_back()
                && !evicted.read
            {
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }

        self.debug_check();
        Some(record)
    }

    /// Mark one record read. Returns `true` if it was unread.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(record) = self.notifications.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if record.read {
            return false;
        }

        record.read = true;
        record.toast_dismissed = true;
        self.unread_count = self.unread_count.saturating_sub(1);
        self.debug_check();
        true
    }

    /// Mark every record read. Returns how many were unread.
    pub fn mark_all_read(&mut self) -> usize {
        let previously_unread = self.unread_count;
        for record in self.notifications.iter_mut() {
            record.read = true;
            record.toast_dismissed = true;
        }
        self.unread_count = 0;
        self.debug_check();
        previously_unread
    }

    /// Hide a record's toast. Never changes `read`.
    pub fn hide_toast(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(record) if !record.toast_dismissed => {
                record.toast_dismissed = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<NotificationRecord> {
        let index = self.notifications.iter().position(|n| n.id == id)?;
        let removed = self.notifications.remove(index)?;
        if !removed.read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        self.debug_check();
        Some(removed)
    }

    /// Remove everything. Returns the number of records removed.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.notifications.len();
        self.notifications.clear();
        self.unread_count = 0;
        removed
    }

    /// Drop read records created before `cutoff`. Unread records are kept.
    pub fn evict_read_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.notifications.len();
        self.notifications.retain(|n| !(n.read && n.created_at < cutoff));
        self.debug_check();
        before - self.notifications.len()
    }

    /// Recount unread records and compare with the maintained counter.
    pub fn check_consistency(&self) -> bool {
        self.notifications.iter().filter(|n| !n.read).count() == self.unread_count
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_consistency(),
            "unread counter {} out of sync with records",
            self.unread_count
        );
    }
}
