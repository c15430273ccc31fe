//! Connection state model.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a hub connection.
///
/// ```text
/// Connecting --(handshake ok, groups joined)--> Connected
/// Connected  --(transport drop)---------------> Reconnecting
/// Reconnecting --(resume ok, groups rejoined)-> Connected
/// Reconnecting --(policy exhausted)-----------> Disconnected
/// Disconnected --(manual restart)-------------> Connecting
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial connection (or manual restart) in progress.
    #[default]
    Connecting,
    /// Link established and re-subscriptions issued.
    Connected,
    /// Link dropped, automatic reconnection in progress.
    Reconnecting,
    /// No link and no automatic reconnection pending.
    Disconnected,
}

impl ConnectionState {
    /// Whether messages can currently be exchanged with the hub.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the presentation layer should show an offline indicator.
    pub fn is_offline(&self) -> bool {
        !self.is_connected()
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Counters shared between the connection task and its handle.
#[derive(Debug, Default)]
pub(crate) struct ConnectionCounters {
    connects: AtomicU64,
    reconnects: AtomicU64,
    messages_received: AtomicU64,
}

impl ConnectionCounters {
    pub(crate) fn record_connect(&self, is_reconnect: bool) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if is_reconnect {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            connects: self.connects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time connection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Successful connects, including reconnects.
    pub connects: u64,
    /// Successful automatic reconnects.
    pub reconnects: u64,
    /// Invocations received from the hub.
    pub messages_received: u64,
}
