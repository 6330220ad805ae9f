use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use sockbus_frame::FrameConfig;
use sockbus_transport::{Address, IpcStream, Listener};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionEnd};
use crate::dispatch::EventSink;
use crate::error::{EndpointError, Result};
use crate::event::Event;
use crate::peer::{PeerHandle, PeerId, PeerIds};
use crate::pool::ConnectionPool;

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

struct Shared {
    pool: Mutex<ConnectionPool>,
    events: EventSink,
    frame_config: FrameConfig,
    peer_ids: Arc<PeerIds>,
}

impl Shared {
    fn pool(&self) -> MutexGuard<'_, ConnectionPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(
        self: &Arc<Self>,
        stream: IpcStream,
        cancel: &CancellationToken,
        connections: &mut JoinSet<()>,
    ) {
        let token = cancel.child_token();
        let (peer, outbound) =
            PeerHandle::new(self.peer_ids.next(), stream.peer_label(), token.clone());
        info!(peer = %peer.id(), remote = peer.label(), "peer connected");
        self.pool().add(peer.clone());
        self.events.send(Event::Connect(peer.clone()));

        let shared = Arc::clone(self);
        connections.spawn(async move {
            let id = peer.id();
            let end = connection::run(
                stream,
                peer,
                outbound,
                shared.events.clone(),
                shared.frame_config,
                token,
            )
            .await;
            shared.release(id, end);
        });
    }

    fn release(&self, id: PeerId, end: ConnectionEnd) {
        if let ConnectionEnd::Failed(err) = end {
            self.events.error(err);
        }
        self.forget(id);
    }

    /// Remove a connection and announce it, once.
    fn forget(&self, id: PeerId) {
        let removed = self.pool().remove(id);
        if let Some(peer) = removed {
            info!(peer = %id, "peer disconnected");
            self.events.send(Event::Disconnect(peer));
        }
    }
}

/// A listening server and its connection pool.
pub(crate) struct Server {
    shared: Arc<Shared>,
    local: Address,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Server {
    /// Bind and start accepting.
    pub(crate) async fn start(
        config: &ServerConfig,
        events: EventSink,
        peer_ids: Arc<PeerIds>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = Listener::bind(&config.address()).await?;
        let local = listener.local_address()?;
        info!(address = %local, "listening");

        let shared = Arc::new(Shared {
            pool: Mutex::new(ConnectionPool::new()),
            events,
            frame_config: config.frame_config(),
            peer_ids,
        });
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared), cancel.clone()));

        Ok(Self {
            shared,
            local,
            cancel,
            task,
        })
    }

    pub(crate) fn local_address(&self) -> &Address {
        &self.local
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.shared.pool().len()
    }

    pub(crate) fn peer_ids(&self) -> Vec<PeerId> {
        self.shared.pool().ids()
    }

    /// Queue `frame` on every pooled connection. Connections that can no
    /// longer be written to are reported and dropped from the pool.
    pub(crate) fn broadcast(&self, frame: &Bytes) {
        let failures = self.shared.pool().broadcast(frame);
        for (id, err) in failures {
            warn!(peer = %id, error = %err, "broadcast write failed");
            self.shared.events.error(err);
            self.shared.forget(id);
        }
    }

    pub(crate) fn send_to(&self, id: PeerId, frame: Bytes) -> Result<()> {
        let peer = self
            .shared
            .pool()
            .get(id)
            .cloned()
            .ok_or(EndpointError::UnknownPeer(id))?;
        let sent = peer.send_frame(frame);
        if sent.is_err() {
            self.shared.forget(id);
        }
        sent
    }

    /// Stop accepting, close every connection and wait for them to finish.
    pub(crate) async fn close(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "accept loop failed");
        }
        for peer in self.shared.pool().drain() {
            self.shared.events.send(Event::Disconnect(peer));
        }
        info!(address = %self.local, "server closed");
    }
}

async fn accept_loop(listener: Listener, shared: Arc<Shared>, cancel: CancellationToken) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => shared.admit(stream, &cancel, &mut connections),
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    shared.events.error(err.into());
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "connection task failed");
                }
            }
        }
    }

    // Unbinds (and for Unix sockets removes the socket file) before
    // waiting on the connections.
    drop(listener);
    while connections.join_next().await.is_some() {}
    debug!("accept loop finished");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sockbus_frame::encode_message;
    use sockbus_mediator::{listener, Mediator, TopicMediator};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::dispatch::spawn_dispatcher;
    use crate::event::{CONNECT, DISCONNECT, ERROR};

    const DEADLINE: Duration = Duration::from_secs(5);

    async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(DEADLINE, rx.recv())
            .await
            .expect("event should arrive before the deadline")
            .expect("listener channel should stay open")
    }

    #[tokio::test]
    async fn broadcast_drops_only_the_dead_peer() {
        let mediator = Arc::new(TopicMediator::<Event>::new());
        let (tx, mut lifecycle) = mpsc::unbounded_channel();
        for topic in [CONNECT, DISCONNECT, ERROR] {
            let tx = tx.clone();
            mediator.on(
                topic,
                listener(move |event: &Event| {
                    let _ = tx.send(event.clone());
                }),
            );
        }
        let (events, _dispatcher) = spawn_dispatcher(mediator);
        let peer_ids = Arc::new(PeerIds::default());
        let server = Server::start(
            &ServerConfig::tcp("127.0.0.1", 0),
            events,
            Arc::clone(&peer_ids),
            CancellationToken::new(),
        )
        .await
        .expect("server should bind");
        let Address::Tcp { host, port } = server.local_address().clone() else {
            panic!("tcp server expected");
        };

        let mut live = Vec::new();
        for _ in 0..2 {
            let stream = TcpStream::connect((host.as_str(), port))
                .await
                .expect("client should connect");
            live.push(stream);
            assert!(matches!(next(&mut lifecycle).await, Event::Connect(_)));
        }

        // Pooled, but its connection task is already gone.
        let (dead, outbound) = PeerHandle::new(peer_ids.next(), "dead", CancellationToken::new());
        drop(outbound);
        server.shared.pool().add(dead.clone());
        assert_eq!(server.peer_count(), 3);

        let frame = encode_message("news", &json!({ "n": 1 })).expect("encode");
        server.broadcast(&frame);

        for stream in &mut live {
            let mut buf = vec![0u8; frame.len()];
            tokio::time::timeout(DEADLINE, stream.read_exact(&mut buf))
                .await
                .expect("frame should arrive")
                .expect("read");
            assert_eq!(buf, frame.to_vec());
        }

        let error = next(&mut lifecycle).await;
        assert!(matches!(
            error.as_error(),
            Some(EndpointError::Write { peer, .. }) if *peer == dead.id()
        ));
        let gone = next(&mut lifecycle).await;
        assert!(matches!(&gone, Event::Disconnect(peer) if peer.id() == dead.id()));
        assert_eq!(server.peer_count(), 2);

        // The survivors keep receiving and nothing else is reported.
        server.broadcast(&frame);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(lifecycle.try_recv().is_err());

        server.close().await;
    }
}
