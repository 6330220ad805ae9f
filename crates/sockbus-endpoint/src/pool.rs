use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{EndpointError, Result};
use crate::peer::{PeerHandle, PeerId};

/// The set of live server-side connections.
///
/// Membership is keyed by [`PeerId`], so adding the same connection twice
/// and removing an absent one are both no-ops.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    peers: HashMap<PeerId, PeerHandle>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the connection was already pooled.
    pub fn add(&mut self, peer: PeerHandle) -> bool {
        if self.peers.contains_key(&peer.id()) {
            return false;
        }
        self.peers.insert(peer.id(), peer);
        true
    }

    /// Returns the handle if it was pooled.
    pub fn remove(&mut self, id: PeerId) -> Option<PeerHandle> {
        self.peers.remove(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerHandle> {
        self.peers.get(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Pooled ids in ascending order.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Apply `f` to every connection. A failure for one connection does not
    /// stop the others; failures are returned per peer.
    pub fn for_each<F>(&self, mut f: F) -> Vec<(PeerId, EndpointError)>
    where
        F: FnMut(&PeerHandle) -> Result<()>,
    {
        let mut failures = Vec::new();
        for id in self.ids() {
            if let Some(peer) = self.peers.get(&id) {
                if let Err(err) = f(peer) {
                    failures.push((id, err));
                }
            }
        }
        failures
    }

    /// Queue `frame` on every connection.
    pub fn broadcast(&self, frame: &Bytes) -> Vec<(PeerId, EndpointError)> {
        self.for_each(|peer| peer.send_frame(frame.clone()))
    }

    /// Drop every connection, returning the removed handles.
    pub fn drain(&mut self) -> Vec<PeerHandle> {
        let mut peers: Vec<PeerHandle> = self.peers.drain().map(|(_, peer)| peer).collect();
        peers.sort_by_key(PeerHandle::id);
        peers
    }
}
