//! Notification center configuration.
//!
//! Every field has a serde default so a config file only needs `hub_url`.
//! Environment overrides are applied on top of the file.

use hub_client::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Environment variable overriding [`NotificationConfig::hub_url`].
pub const HUB_URL_ENV: &str = "NOTIFY_HUB_URL";

/// Configuration for a notification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Absolute URL of the notification hub (`http(s)` or `ws(s)`).
    #[serde(default)]
    pub hub_url: String,
    /// Delays before each automatic reconnect attempt after a drop.
    #[serde(default = "default_reconnect_delays_ms")]
    pub reconnect_delays_ms: Vec<u64>,
    /// Interval between initial connect attempts.
    #[serde(default = "default_start_retry_interval_ms")]
    pub start_retry_interval_ms: u64,
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    #[serde(default = "default_server_timeout_ms")]
    pub server_timeout_ms: u64,
    /// Time allowed for the hub to answer the protocol handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Store capacity; the oldest records are dropped beyond it.
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,
    /// Age after which read records are swept.
    #[serde(default = "default_retention_horizon_secs")]
    pub retention_horizon_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Client method the hub invokes to push a notification.
    #[serde(default = "default_receive_target")]
    pub receive_target: String,
    #[serde(default = "default_join_user_group_method")]
    pub join_user_group_method: String,
    #[serde(default = "default_join_role_group_method")]
    pub join_role_group_method: String,
    #[serde(default = "default_test_connection_method")]
    pub test_connection_method: String,
    #[serde(default = "default_test_notification_method")]
    pub test_notification_method: String,
    /// Capacity of the inbound message channel.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
    /// Log filter applied once the config is loaded, unless the command line set one.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_reconnect_delays_ms() -> Vec<u64> {
    hub_client::policy::DEFAULT_RECONNECT_DELAYS_MS.to_vec()
}

fn default_start_retry_interval_ms() -> u64 {
    5_000
}

fn default_keep_alive_interval_ms() -> u64 {
    15_000
}

fn default_server_timeout_ms() -> u64 {
    30_000
}

fn default_handshake_timeout_ms() -> u64 {
    15_000
}

fn default_max_notifications() -> usize {
    50
}

fn default_retention_horizon_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    30 * 60
}

fn default_receive_target() -> String {
    "ReceiveNotification".to_string()
}

fn default_join_user_group_method() -> String {
    "JoinUserGroup".to_string()
}

fn default_join_role_group_method() -> String {
    "JoinRoleGroup".to_string()
}

fn default_test_connection_method() -> String {
    "TestConnection".to_string()
}

fn default_test_notification_method() -> String {
    "SendTestNotification".to_string()
}

fn default_inbound_buffer() -> usize {
    100
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            hub_url: String::new(),
            reconnect_delays_ms: default_reconnect_delays_ms(),
            start_retry_interval_ms: default_start_retry_interval_ms(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            server_timeout_ms: default_server_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_notifications: default_max_notifications(),
            retention_horizon_secs: default_retention_horizon_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            receive_target: default_receive_target(),
            join_user_group_method: default_join_user_group_method(),
            join_role_group_method: default_join_role_group_method(),
            test_connection_method: default_test_connection_method(),
            test_notification_method: default_test_notification_method(),
            inbound_buffer: default_inbound_buffer(),
            log_filter: None,
        }
    }
}

impl NotificationConfig {
    /// Defaults with the given hub URL.
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid config: {}", e)))
    }

    /// Load a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.display(), "Loaded notification config");
        Ok(config)
    }

    /// Apply `NOTIFY_HUB_URL` if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(HUB_URL_ENV)
            && !url.trim().is_empty()
        {
            self.hub_url = url.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hub_url.trim().is_empty() {
            return Err(Error::config("hub_url must not be empty"));
        }
        let url = Url::parse(&self.hub_url)
            .map_err(|e| Error::config(format!("hub_url is not a valid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(Error::config(format!(
                "hub_url scheme must be http(s) or ws(s), got {}",
                url.scheme()
            )));
        }
        let timers = [
            ("start_retry_interval_ms", self.start_retry_interval_ms),
            ("keep_alive_interval_ms", self.keep_alive_interval_ms),
            ("server_timeout_ms", self.server_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(Error::config(format!("{} must be at least 1", name)));
            }
        }
        if self.max_notifications == 0 {
            return Err(Error::config("max_notifications must be at least 1"));
        }
        if self.inbound_buffer == 0 {
            return Err(Error::config("inbound_buffer must be at least 1"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::config("sweep_interval_secs must be at least 1"));
        }
        if self.receive_target.is_empty() {
            return Err(Error::config("receive_target must not be empty"));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_millis(&self.reconnect_delays_ms)
    }

    pub fn start_retry_interval(&self) -> Duration {
        Duration::from_millis(self.start_retry_interval_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn retention_horizon(&self) -> Duration {
        Duration::from_secs(self.retention_horizon_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
