//! Transient notification presentation.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::model::{NotificationRecord, ToastSeverity};

/// A toast to present.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    /// Id of the stored record, `None` for ephemeral toasts.
    pub notification_id: Option<String>,
    pub severity: ToastSeverity,
    pub icon: &'static str,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

impl Toast {
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            notification_id: Some(record.id.clone()),
            severity: record.notification_type.severity(),
            icon: record.notification_type.icon(),
            title: record.title.clone(),
            message: record.message.clone(),
            action_url: record.action_url.clone(),
        }
    }

    /// An error toast that is not backed by a stored record.
    pub fn ephemeral_error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            notification_id: None,
            severity: ToastSeverity::Error,
            icon: "x-circle",
            title: title.into(),
            message: message.into(),
            action_url: None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.notification_id.is_none()
    }
}

/// Presentation surface for toasts.
pub trait ToastPresenter: Send + Sync {
    fn show(&self, toast: Toast);
}

impl<T: ToastPresenter + ?Sized> ToastPresenter for Arc<T> {
    fn show(&self, toast: Toast) {
        (**self).show(toast)
    }
}

/// Writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingToasts;

impl ToastPresenter for TracingToasts {
    fn show(&self, toast: Toast) {
        let id = toast.notification_id.as_deref().unwrap_or("-");
        match toast.severity {
            ToastSeverity::Error => {
                error!(id, icon = toast.icon, "{}: {}", toast.title, toast.message)
            }
            ToastSeverity::Warning => {
                warn!(id, icon = toast.icon, "{}: {}", toast.title, toast.message)
            }
            ToastSeverity::Info | ToastSeverity::Success => {
                info!(id, icon = toast.icon, severity = %toast.severity, "{}: {}", toast.title, toast.message)
            }
        }
    }
}

/// Forwards toasts into a channel.
#[derive(Debug, Clone)]
pub struct ChannelToasts {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelToasts {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ToastPresenter for ChannelToasts {
    fn show(&self, toast: Toast) {
        // Receiver gone means nobody is presenting anymore.
        let _ = self.tx.send(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationType;
    use chrono::Utc;

    #[test]
    fn test_toast_from_record() {
        let record = NotificationRecord {
            id: "n1".to_string(),
            notification_type: NotificationType::EventCancelled,
            title: "Cancelled".to_string(),
            message: "Meetup is off".to_string(),
            created_at: Utc::now(),
            read: false,
            toast_dismissed: false,
            action_url: Some("/events/1".to_string()),
            data: None,
            user_id: None,
            user_email: None,
            interactive: true,
        };

        let toast = Toast::from_record(&record);
        assert_eq!(toast.severity, ToastSeverity::Warning);
        assert_eq!(toast.icon, "calendar-x");
        assert_eq!(toast.notification_id.as_deref(), Some("n1"));
        assert!(!toast.is_ephemeral());
    }

    #[test]
    fn test_channel_toasts() {
        let (toasts, mut rx) = ChannelToasts::new();
        toasts.show(Toast::ephemeral_error("Connection test failed", "not connected"));

        let toast = rx.try_recv().unwrap();
        assert!(toast.is_ephemeral());
        assert_eq!(toast.severity, ToastSeverity::Error);
    }
}
