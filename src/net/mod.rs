//! Device networking: endpoint addressing and the WebSocket transport session.

pub mod endpoint;
pub mod session;

pub use endpoint::{DEFAULT_DEVICE_PORT, Endpoint};
pub use session::{ConnectionState, TransportEvent, TransportSession, WireMessage};

use thiserror::Error;

/// Errors surfaced by the transport session.
///
/// These are reported as [`TransportEvent::Error`] through the session's
/// event channel, never returned from `connect`/`send`/`disconnect` directly.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("not connected to the device")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}
