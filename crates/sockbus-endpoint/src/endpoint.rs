use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use sockbus_frame::encode_message;
use sockbus_mediator::{listener, Mediator, TopicMediator};
use sockbus_transport::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::Client;
use crate::config::{ClientConfig, ServerConfig};
use crate::dispatch::{spawn_dispatcher, EventSink};
use crate::error::{EndpointError, Result};
use crate::event::Event;
use crate::lifecycle::LifecycleState;
use crate::peer::{PeerId, PeerIds};
use crate::server::Server;

/// Which side of a connection an endpoint is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Idle,
    Server,
    Client,
}

enum Active {
    Server(Server),
    Client(Client),
}

/// The endpoint's current role with the dispatcher serving it.
struct Running {
    active: Active,
    events: EventSink,
    dispatcher: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Running {
    /// Stop the role and wait for the dispatcher to deliver every queued
    /// event. `announce` controls whether `close` is emitted.
    async fn shutdown(self, announce: bool) {
        let Running {
            active,
            events,
            dispatcher,
            cancel,
        } = self;

        match active {
            Active::Server(server) => {
                server.close().await;
                if announce {
                    events.send(Event::Close);
                }
            }
            Active::Client(client) if announce => client.close().await,
            Active::Client(client) => client.abandon().await,
        }
        cancel.cancel();
        drop(events);
        if let Err(err) = dispatcher.await {
            warn!(error = %err, "dispatcher failed");
        }
    }
}

struct Inner {
    mediator: Arc<dyn Mediator<Event>>,
    running: Mutex<Option<Running>>,
    peer_ids: Arc<PeerIds>,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A messaging endpoint: a server accepting many peers or a client with
/// one connection.
///
/// Listeners registered with [`Endpoint::on`] see decoded messages under
/// their topic plus the lifecycle topics `connect`, `disconnect`, `close`
/// and `error`. All listeners run on one dispatcher task, one event at a
/// time, in the order events occurred.
///
/// `Endpoint` is cheap to clone; clones share the same role and listeners.
/// Dropping the last clone shuts everything down without emitting `close`.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl Endpoint {
    /// Endpoint with an exact-match topic mediator.
    pub fn new() -> Self {
        Self::with_mediator(Arc::new(TopicMediator::new()))
    }

    /// Endpoint with a caller-supplied mediator.
    pub fn with_mediator(mediator: Arc<dyn Mediator<Event>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                mediator,
                running: Mutex::new(None),
                peer_ids: Arc::new(PeerIds::default()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a listener for `topic`. Returns `self` for chaining.
    pub fn on<F>(&self, topic: &str, f: F) -> &Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.mediator.on(topic, listener(f));
        self
    }

    pub fn mediator(&self) -> &Arc<dyn Mediator<Event>> {
        &self.inner.mediator
    }

    /// Start serving. Resolves once the listener is bound.
    pub async fn listen(&self, config: ServerConfig) -> Result<()> {
        config.validate()?;
        self.ensure_idle()?;

        let cancel = self.inner.cancel.child_token();
        let (events, dispatcher) = spawn_dispatcher(Arc::clone(&self.inner.mediator));
        let started = Server::start(
            &config,
            events.clone(),
            Arc::clone(&self.inner.peer_ids),
            cancel.child_token(),
        )
        .await;
        let server = match started {
            Ok(server) => server,
            Err(err) => {
                drop(events);
                let _ = dispatcher.await;
                return Err(err);
            }
        };

        self.install(Running {
            active: Active::Server(server),
            events,
            dispatcher,
            cancel,
        })
        .await
    }

    /// Connect as a client. Resolves with the outcome of the first
    /// connection; see [`ClientConfig`] for timeout and reconnect behavior.
    ///
    /// A client that gave up earlier (timed out, or lost its connection
    /// with reconnect disabled) may connect again, with a new config.
    pub async fn connect(&self, config: ClientConfig) -> Result<()> {
        config.validate()?;
        self.retire_idle_client().await;
        self.ensure_idle()?;

        let cancel = self.inner.cancel.child_token();
        let (events, dispatcher) = spawn_dispatcher(Arc::clone(&self.inner.mediator));
        let client = Client::spawn(
            &config,
            events.clone(),
            Arc::clone(&self.inner.peer_ids),
            cancel.child_token(),
        );
        let outcome = client.request_connect();

        self.install(Running {
            active: Active::Client(client),
            events,
            dispatcher,
            cancel,
        })
        .await?;
        outcome.await.unwrap_or(Err(EndpointError::Closed))
    }

    /// Send to every connected peer (server) or to the server (client).
    ///
    /// A client without a connection returns [`EndpointError::NotConnected`].
    /// Per-peer write failures on a server are reported on `error` and do
    /// not fail the call.
    pub fn emit<T: Serialize + ?Sized>(&self, topic: &str, data: &T) -> Result<()> {
        let frame = encode_message(topic, data)?;
        let running = self.running();
        match running.as_ref().map(|running| &running.active) {
            Some(Active::Server(server)) => {
                server.broadcast(&frame);
                Ok(())
            }
            Some(Active::Client(client)) => client.send_frame(frame),
            None => Err(EndpointError::NotConnected),
        }
    }

    /// Send to one peer. A client has only one peer and ignores `peer`.
    pub fn emit_to<T: Serialize + ?Sized>(
        &self,
        peer: PeerId,
        topic: &str,
        data: &T,
    ) -> Result<()> {
        let frame = encode_message(topic, data)?;
        let running = self.running();
        match running.as_ref().map(|running| &running.active) {
            Some(Active::Server(server)) => server.send_to(peer, frame),
            Some(Active::Client(client)) => client.send_frame(frame),
            None => Err(EndpointError::NotConnected),
        }
    }

    /// Same as [`Endpoint::emit`].
    pub fn broadcast<T: Serialize + ?Sized>(&self, topic: &str, data: &T) -> Result<()> {
        self.emit(topic, data)
    }

    /// Fire-and-forget [`Endpoint::emit`]: failures go to `error` listeners.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, data: &T) {
        let Err(err) = self.emit(topic, data) else {
            return;
        };
        let running = self.running();
        match running.as_ref() {
            Some(running) => running.events.error(err),
            None => warn!(topic, error = %err, "publish failed with no active role"),
        }
    }

    /// Shut down the active role.
    ///
    /// A server stops accepting, closes every connection (each reported on
    /// `disconnect`) and emits `close`. A client closes its connection,
    /// disables reconnection and emits `close`. Returns after every
    /// resulting event has been delivered. Closing an idle endpoint is a
    /// no-op.
    pub async fn close(&self) {
        let running = self.running().take();
        if let Some(running) = running {
            running.shutdown(true).await;
        }
    }

    pub fn role(&self) -> Role {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Server(_)) => Role::Server,
            Some(Active::Client(_)) => Role::Client,
            None => Role::Idle,
        }
    }

    /// Live connections: pool size for a server, 0 or 1 for a client.
    pub fn peer_count(&self) -> usize {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Server(server)) => server.peer_count(),
            Some(Active::Client(client)) => {
                usize::from(client.state() == LifecycleState::Connected)
            }
            None => 0,
        }
    }

    /// Pooled connection ids (server only).
    pub fn peers(&self) -> Vec<PeerId> {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Server(server)) => server.peer_ids(),
            _ => Vec::new(),
        }
    }

    /// Bound address for a server (with the real port if 0 was requested),
    /// target address for a client.
    pub fn local_address(&self) -> Option<Address> {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Server(server)) => Some(server.local_address().clone()),
            Some(Active::Client(client)) => Some(client.address().clone()),
            None => None,
        }
    }

    /// Client connection state; `None` unless acting as a client.
    pub fn state(&self) -> Option<LifecycleState> {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Client(client)) => Some(client.state()),
            _ => None,
        }
    }

    /// Observe client state changes.
    pub fn watch_state(&self) -> Option<watch::Receiver<LifecycleState>> {
        match self.running().as_ref().map(|running| &running.active) {
            Some(Active::Client(client)) => Some(client.watch_state()),
            _ => None,
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.role() {
            Role::Idle => Ok(()),
            Role::Server => Err(EndpointError::InvalidState("endpoint is already a server".into())),
            Role::Client => Err(EndpointError::InvalidState("endpoint is already a client".into())),
        }
    }

    /// Make `running` the active role, unless another start won the race.
    async fn install(&self, running: Running) -> Result<()> {
        let rejected = {
            let mut slot = self.running();
            if slot.is_none() {
                *slot = Some(running);
                None
            } else {
                Some(running)
            }
        };
        match rejected {
            None => Ok(()),
            Some(running) => {
                debug!("concurrent role start, discarding");
                running.shutdown(false).await;
                Err(EndpointError::InvalidState(
                    "endpoint role changed while starting".into(),
                ))
            }
        }
    }

    /// Drop a client that has given up so the endpoint can be reused. A
    /// client waiting to retry has not given up.
    async fn retire_idle_client(&self) {
        let idle = {
            let mut slot = self.running();
            let gave_up = matches!(
                slot.as_ref().map(|running| &running.active),
                Some(Active::Client(client)) if client.is_settled()
            );
            if gave_up {
                slot.take()
            } else {
                None
            }
        };
        if let Some(running) = idle {
            debug!("replacing idle client");
            running.shutdown(false).await;
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role())
            .field("address", &self.local_address())
            .finish()
    }
}
