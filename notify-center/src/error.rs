//! Notification center error types.

use thiserror::Error;

/// Notification center result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Notification center error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Hub error: {0}")]
    Hub(#[from] hub_client::HubError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }
}
