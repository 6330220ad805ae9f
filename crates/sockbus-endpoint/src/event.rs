use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EndpointError;
use crate::peer::PeerHandle;

/// Emitted when a connection is established.
pub const CONNECT: &str = "connect";
/// Emitted when a server-side connection goes away.
pub const DISCONNECT: &str = "disconnect";
/// Emitted once when the endpoint shuts down.
pub const CLOSE: &str = "close";
/// Emitted for every asynchronous failure.
pub const ERROR: &str = "error";

/// Topics the endpoint emits on its own behalf.
pub const RESERVED_TOPICS: [&str; 4] = [CONNECT, DISCONNECT, CLOSE, ERROR];

/// Whether `topic` is one of the lifecycle topics.
///
/// Applications may still send messages on these topics; listeners then see
/// both the lifecycle event and the message.
pub fn is_reserved(topic: &str) -> bool {
    RESERVED_TOPICS.contains(&topic)
}

/// Everything a listener can observe.
#[derive(Debug, Clone)]
pub enum Event {
    /// A decoded message from `peer`.
    Message {
        topic: String,
        data: Value,
        peer: PeerHandle,
    },
    Connect(PeerHandle),
    Disconnect(PeerHandle),
    Close,
    Error(Arc<EndpointError>),
}

impl Event {
    pub(crate) fn error(err: EndpointError) -> Self {
        Event::Error(Arc::new(err))
    }

    /// Topic listeners are looked up by.
    pub fn topic(&self) -> &str {
        match self {
            Event::Message { topic, .. } => topic,
            Event::Connect(_) => CONNECT,
            Event::Disconnect(_) => DISCONNECT,
            Event::Close => CLOSE,
            Event::Error(_) => ERROR,
        }
    }

    /// Message payload, if this is a message.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Event::Message { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Payload deserialized as `T`. `None` for non-message events or when
    /// the payload has a different shape.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.data()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }

    /// Connection the event concerns, if any.
    pub fn peer(&self) -> Option<&PeerHandle> {
        match self {
            Event::Message { peer, .. } | Event::Connect(peer) | Event::Disconnect(peer) => {
                Some(peer)
            }
            Event::Close | Event::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&EndpointError> {
        match self {
            Event::Error(err) => Some(err),
            _ => None,
        }
    }
}
