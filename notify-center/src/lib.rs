//! Real-time notification center.
//!
//! Receives notifications pushed over a [`hub_client`] connection, keeps them
//! in a bounded newest-first store with read tracking, and exposes the store
//! to presentation surfaces as snapshots, change events and toasts.
//!
//! ## Core Types
//!
//! - [`NotificationSession`] - Login-to-logout lifecycle: connection, handler, sweeper
//! - [`NotificationCenter`] - Shared store context with intents and change broadcast
//! - [`NotificationStore`] - Bounded store keeping the unread counter in sync
//! - [`InboundEventHandler`] - Normalizes pushed payloads into records
//! - [`RetentionSweeper`] - Evicts old read records on a timer
//! - [`ToastPresenter`] - Transient presentation contract

pub mod center;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod sweeper;
pub mod toast;

pub use center::{NotificationCenter, NotificationSnapshot, StoreChange};
pub use config::NotificationConfig;
pub use error::{Error, Result};
pub use handler::InboundEventHandler;
pub use model::{
    NewNotification, NotificationRecord, NotificationType, ServerNotification, ToastSeverity,
};
pub use session::{AuthProvider, Identity, NotificationSession};
pub use store::NotificationStore;
pub use sweeper::RetentionSweeper;
pub use toast::{ChannelToasts, Toast, ToastPresenter, TracingToasts};

pub use hub_client::ConnectionState;
