use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use sockbus_frame::encode_message;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{EndpointError, Result};

/// Frames a connection may have queued before its peer counts as stalled.
pub const OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// Identifier of one live connection, unique within an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Hands out peer ids for one endpoint.
#[derive(Debug, Default)]
pub(crate) struct PeerIds {
    next: AtomicU64,
}

impl PeerIds {
    pub(crate) fn next(&self) -> PeerId {
        PeerId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Handle to one live connection.
///
/// Frames sent through a handle are queued and written by the connection's
/// own task, so sending never blocks. Once the connection is gone every
/// send fails with [`EndpointError::Write`]. A peer that lets
/// [`OUTBOUND_QUEUE_DEPTH`] frames pile up is disconnected.
#[derive(Clone)]
pub struct PeerHandle {
    id: PeerId,
    label: Arc<str>,
    outbound: mpsc::Sender<Bytes>,
    closer: CancellationToken,
}

impl PeerHandle {
    /// `closer` shuts the connection down when its queue overflows.
    pub(crate) fn new(
        id: PeerId,
        label: impl Into<Arc<str>>,
        closer: CancellationToken,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let handle = Self {
            id,
            label: label.into(),
            outbound,
            closer,
        };
        (handle, rx)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Remote address of the connection, or the transport name when the
    /// peer is unnamed.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send one message to this peer only.
    pub fn emit<T: Serialize + ?Sized>(&self, topic: &str, data: &T) -> Result<()> {
        let frame = encode_message(topic, data)?;
        self.send_frame(frame)
    }

    /// True once the connection has shut down.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    pub(crate) fn send_frame(&self, frame: Bytes) -> Result<()> {
        let reason = match self.outbound.try_send(frame) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => "connection closed",
            Err(TrySendError::Full(_)) => {
                warn!(
                    peer = %self.id,
                    depth = OUTBOUND_QUEUE_DEPTH,
                    "outbound queue full, disconnecting"
                );
                self.closer.cancel();
                "outbound queue full"
            }
        };
        Err(EndpointError::Write {
            peer: self.id,
            reason: reason.to_string(),
        })
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerHandle {}
