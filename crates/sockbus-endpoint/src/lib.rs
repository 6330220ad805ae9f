//! Topic-based messaging endpoints over local sockets.
//!
//! An [`Endpoint`] either listens (accepting any number of peers into a
//! connection pool) or connects (one outbound connection with optional
//! timeout and reconnection). Messages are `{topic, data}` JSON objects
//! framed by [`sockbus_frame::DELIMITER`]; inbound messages and lifecycle
//! events are routed to listeners through a [`sockbus_mediator::Mediator`].

mod client;
mod connection;
mod dispatch;
mod server;

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod peer;
pub mod pool;

pub use config::{
    ClientConfig, Encoding, ServerConfig, DEFAULT_CONNECT_TIMEOUT_MS, RECONNECT_DISABLED,
};
pub use endpoint::{Endpoint, Role};
pub use error::{EndpointError, Result};
pub use event::{is_reserved, Event, CLOSE, CONNECT, DISCONNECT, ERROR, RESERVED_TOPICS};
pub use lifecycle::{Action, Lifecycle, LifecycleEvent, LifecycleState, Notice};
pub use peer::{PeerHandle, PeerId, OUTBOUND_QUEUE_DEPTH};
pub use pool::ConnectionPool;
