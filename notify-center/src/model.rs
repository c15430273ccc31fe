//! Notification records and their wire representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Category of a notification.
///
/// Serialized with the hub's names. Unknown names and out-of-range numeric
/// codes deserialize to [`NotificationType::Info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotificationType {
    EventCreated,
    EventUpdated,
    EventCancelled,
    RegistrationConfirmed,
    RegistrationCancelled,
    EventReminder,
    EventCapacityReached,
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

const NOTIFICATION_TYPES: [NotificationType; 11] = [
    NotificationType::EventCreated,
    NotificationType::EventUpdated,
    NotificationType::EventCancelled,
    NotificationType::RegistrationConfirmed,
    NotificationType::RegistrationCancelled,
    NotificationType::EventReminder,
    NotificationType::EventCapacityReached,
    NotificationType::Info,
    NotificationType::Success,
    NotificationType::Warning,
    NotificationType::Error,
];

/// Semantic severity used to style a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for ToastSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl NotificationType {
    pub fn all() -> &'static [NotificationType] {
        &NOTIFICATION_TYPES
    }

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventCreated => "EventCreated",
            Self::EventUpdated => "EventUpdated",
            Self::EventCancelled => "EventCancelled",
            Self::RegistrationConfirmed => "RegistrationConfirmed",
            Self::RegistrationCancelled => "RegistrationCancelled",
            Self::EventReminder => "EventReminder",
            Self::EventCapacityReached => "EventCapacityReached",
            Self::Info => "Info",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }

    /// Parse a wire name, ignoring ASCII case. Unknown names map to `Info`.
    pub fn from_wire(name: &str) -> Self {
        let name = name.trim();
        NOTIFICATION_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(Self::Info)
    }

    /// Parse a numeric code in declaration order. Unknown codes map to `Info`.
    pub fn from_code(code: i64) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|i| NOTIFICATION_TYPES.get(i).copied())
            .unwrap_or(Self::Info)
    }

    pub fn severity(&self) -> ToastSeverity {
        match self {
            Self::EventCreated | Self::RegistrationConfirmed | Self::Success => {
                ToastSeverity::Success
            }
            Self::EventUpdated | Self::EventReminder | Self::Info => ToastSeverity::Info,
            Self::EventCancelled
            | Self::RegistrationCancelled
            | Self::EventCapacityReached
            | Self::Warning => ToastSeverity::Warning,
            Self::Error => ToastSeverity::Error,
        }
    }

    /// Icon key for presentation surfaces.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::EventCreated => "calendar-plus",
            Self::EventUpdated => "calendar-edit",
            Self::EventCancelled => "calendar-x",
            Self::RegistrationConfirmed => "user-check",
            Self::RegistrationCancelled => "user-x",
            Self::EventReminder => "alarm-clock",
            Self::EventCapacityReached => "users",
            Self::Info => "info",
            Self::Success => "check-circle",
            Self::Warning => "alert-triangle",
            Self::Error => "x-circle",
        }
    }

    /// Title used when the server sends none.
    pub fn default_title(&self) -> &'static str {
        match self {
            Self::EventCreated => "Event Created",
            Self::EventUpdated => "Event Updated",
            Self::EventCancelled => "Event Cancelled",
            Self::RegistrationConfirmed => "Registration Confirmed",
            Self::RegistrationCancelled => "Registration Cancelled",
            Self::EventReminder => "Event Reminder",
            Self::EventCapacityReached => "Event Capacity Reached",
            Self::Info => "Notification",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Code(i64),
            Other(Value),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Name(name) => Self::from_wire(&name),
            Raw::Code(code) => Self::from_code(code),
            Raw::Other(_) => Self::Info,
        })
    }
}

/// A notification as pushed by the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNotification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    /// `false` stores the notification without a toast.
    #[serde(default)]
    pub interactive: Option<bool>,
}

/// Input to [`NotificationStore::add`](crate::store::NotificationStore::add).
///
/// The store assigns a fresh id when `id` is absent or blank and the receipt
/// time when `created_at` is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub id: Option<String>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
    pub action_url: Option<String>,
    pub data: Option<Value>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub interactive: bool,
}

impl NewNotification {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            created_at: None,
            action_url: None,
            data: None,
            user_id: None,
            user_email: None,
            interactive: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }
}

impl From<ServerNotification> for NewNotification {
    fn from(n: ServerNotification) -> Self {
        let title = match n.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => n.notification_type.default_title().to_string(),
        };

        Self {
            id: n.id,
            notification_type: n.notification_type,
            title,
            message: n.message,
            created_at: n.created_at,
            action_url: n.action_url,
            data: n.data,
            user_id: n.user_id,
            user_email: n.user_email,
            interactive: n.interactive.unwrap_or(true),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// Whether the toast was hidden. Independent of `read`.
    pub toast_dismissed: bool,
    pub action_url: Option<String>,
    pub data: Option<Value>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub interactive: bool,
}

impl NotificationRecord {
    pub fn severity(&self) -> ToastSeverity {
        self.notification_type.severity()
    }
}
