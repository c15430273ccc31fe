//! Hub client error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors that can occur while talking to a push hub.
#[derive(Error, Debug)]
pub enum HubError {
    /// Transport-level connection errors (DNS, TCP, TLS, upgrade).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The hub rejected or never answered the protocol handshake.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Malformed or unexpected hub protocol message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The hub completed an invocation with an error.
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// An invocation was issued while no link was established.
    #[error("Not connected to the hub")]
    NotConnected,

    /// The link dropped before the invocation completed.
    #[error("Connection lost before the invocation completed")]
    ConnectionLost,

    /// The connection task has been stopped.
    #[error("Hub connection stopped")]
    Stopped,

    /// Invalid connection settings.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid hub URL
    #[error("Invalid hub URL: {0}")]
    Url(#[from] url::ParseError),
}

impl HubError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invocation error.
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
