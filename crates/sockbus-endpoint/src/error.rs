use std::time::Duration;

use crate::peer::PeerId;

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Transport-level error (bind, connect, accept, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] sockbus_transport::TransportError),

    /// Frame-level error (encode, decode, oversized frame).
    #[error("frame error: {0}")]
    Frame(#[from] sockbus_frame::FrameError),

    /// The client could not connect within the configured window.
    #[error("connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    /// Writing to one peer failed.
    #[error("write to {peer} failed: {reason}")]
    Write { peer: PeerId, reason: String },

    /// The client has no established connection.
    #[error("not connected")]
    NotConnected,

    /// No pooled connection with this id.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The operation does not apply to the endpoint's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The endpoint was closed before the operation completed.
    #[error("endpoint closed")]
    Closed,

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EndpointError {
    /// A malformed inbound frame. The connection carries on.
    pub fn is_decode(&self) -> bool {
        matches!(self, EndpointError::Frame(err) if err.is_decode())
    }

    /// An outbound payload that could not be serialized.
    pub fn is_encode(&self) -> bool {
        matches!(self, EndpointError::Frame(err) if err.is_encode())
    }
}

pub type Result<T> = std::result::Result<T, EndpointError>;
