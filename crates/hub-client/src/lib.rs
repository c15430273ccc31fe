//! Hub client: a persistent push-channel client for JSON hubs.
//!
//! ## Core Types
//!
//! - [`HubConnectionBuilder`] - Configures and spawns a supervised connection
//! - [`HubConnection`] - Handle for state, invocations, restart and stop
//! - [`HubMessages`] - Single consumer of server invocations, in arrival order
//! - [`ConnectionState`] - `Connecting`, `Connected`, `Reconnecting`, `Disconnected`
//!
//! ## Transports
//!
//! - [`HubTransport`] / [`HubLink`] - Seam between the connection task and the wire
//! - [`WebSocketTransport`] - JSON hub protocol over WebSocket
//! - [`MemoryTransport`] - In-process scripted hub for tests
//!
//! ## Policies
//!
//! - [`ReconnectPolicy`] - Fixed delay sequence after a drop
//! - [`TokenProvider`] - Bearer token resolved fresh on every attempt

pub mod connection;
pub mod error;
pub mod memory;
pub mod policy;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod websocket;

pub use connection::{
    HubConnection, HubConnectionBuilder, HubInvocation, HubMessages, InboundMessage, Resubscribe,
};
pub use error::{HubError, Result};
pub use memory::MemoryTransport;
pub use policy::ReconnectPolicy;
pub use protocol::HubMessage;
pub use state::{ConnectionState, ConnectionStats};
pub use transport::{HubLink, HubTransport, TokenProvider};
pub use websocket::WebSocketTransport;
