//! Topic-based pub/sub messaging over Unix domain sockets and TCP.
//!
//! A server accepts any number of peers; a client holds one connection with
//! an optional connect timeout and automatic reconnection. Messages are
//! `{"topic", "data"}` JSON objects separated by a fixed delimiter, and are
//! delivered to listeners registered per topic.
//!
//! # Crate Structure
//!
//! - [`transport`] — Stream transport (Unix domain sockets, TCP)
//! - [`frame`] — Delimiter framing and the JSON message codec
//! - [`mediator`] — Topic-keyed listener registries
//! - [`endpoint`] — Servers, clients and the connection pool

/// Re-export transport types.
pub mod transport {
    pub use sockbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sockbus_frame::*;
}

/// Re-export mediator types.
pub mod mediator {
    pub use sockbus_mediator::*;
}

/// Re-export endpoint types.
pub mod endpoint {
    pub use sockbus_endpoint::*;
}

pub use sockbus_endpoint::{
    ClientConfig, Endpoint, EndpointError, Event, PeerHandle, PeerId, ServerConfig,
};
