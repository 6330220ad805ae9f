use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use sockbus_frame::FrameConfig;
use sockbus_transport::{Address, IpcStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{self, ConnectionEnd};
use crate::dispatch::EventSink;
use crate::error::{EndpointError, Result};
use crate::event::Event;
use crate::lifecycle::{Action, Lifecycle, LifecycleEvent, LifecycleState, Notice};
use crate::peer::{PeerHandle, PeerIds};

enum Input {
    Connect(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
    AttemptFinished {
        epoch: u64,
        result: sockbus_transport::Result<IpcStream>,
    },
    TimedOut {
        epoch: u64,
    },
    RetryDue {
        epoch: u64,
    },
    ConnectionEnded {
        epoch: u64,
        end: ConnectionEnd,
    },
}

/// Endpoint-side handle to a running client driver.
pub(crate) struct Client {
    inputs: mpsc::UnboundedSender<Input>,
    active: Arc<Mutex<Option<PeerHandle>>>,
    state: watch::Receiver<LifecycleState>,
    settled: Arc<AtomicBool>,
    address: Address,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Client {
    /// Start the driver. Nothing is dialed until [`Client::request_connect`].
    pub(crate) fn spawn(
        config: &ClientConfig,
        events: EventSink,
        peer_ids: Arc<PeerIds>,
        cancel: CancellationToken,
    ) -> Self {
        let (inputs, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(LifecycleState::Disconnected);
        let active = Arc::new(Mutex::new(None));
        let settled = Arc::new(AtomicBool::new(false));
        let address = config.address();

        let driver = Driver {
            machine: Lifecycle::new(config.timeout(), config.reconnect_interval()),
            address: address.clone(),
            frame_config: config.frame_config(),
            events,
            peer_ids,
            inputs: inputs.clone(),
            cancel: cancel.clone(),
            state_tx,
            settled: Arc::clone(&settled),
            active: Arc::clone(&active),
            outcome: None,
            attempt: None,
            timeout_timer: None,
            retry_timer: None,
            connection: None,
            arrived: None,
            staged: None,
        };
        let task = tokio::spawn(driver.run(rx));

        Self {
            inputs,
            active,
            state,
            settled,
            address,
            cancel,
            task,
        }
    }

    /// Ask the driver to dial. The receiver yields the outcome.
    ///
    /// With reconnection enabled the outcome is the first successful
    /// connection, however many attempts that takes, or
    /// [`EndpointError::Closed`] if the client is closed first.
    pub(crate) fn request_connect(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        if self.inputs.send(Input::Connect(tx)).is_err() {
            debug!("client driver already stopped");
        }
        rx
    }

    /// Close the connection, disable reconnection and stop the driver.
    pub(crate) async fn close(self) {
        let (tx, rx) = oneshot::channel();
        if self.inputs.send(Input::Close(tx)).is_ok() {
            let _ = rx.await;
        }
        if let Err(err) = self.task.await {
            warn!(error = %err, "client driver failed");
        }
    }

    /// Stop the driver without emitting lifecycle events.
    pub(crate) async fn abandon(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    pub(crate) fn send_frame(&self, frame: Bytes) -> Result<()> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(peer) => peer.send_frame(frame),
            None => Err(EndpointError::NotConnected),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// True once the client has given up: its connect call is answered, it
    /// is disconnected and no retry is scheduled.
    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    pub(crate) fn address(&self) -> &Address {
        &self.address
    }
}

struct Connection {
    peer: PeerHandle,
    cancel: CancellationToken,
}

struct Staged {
    epoch: u64,
    stream: IpcStream,
    peer: PeerHandle,
    outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
}

/// Owns the lifecycle state machine and carries out its actions.
struct Driver {
    machine: Lifecycle,
    address: Address,
    frame_config: FrameConfig,
    events: EventSink,
    peer_ids: Arc<PeerIds>,
    inputs: mpsc::UnboundedSender<Input>,
    cancel: CancellationToken,
    state_tx: watch::Sender<LifecycleState>,
    settled: Arc<AtomicBool>,
    active: Arc<Mutex<Option<PeerHandle>>>,
    outcome: Option<oneshot::Sender<Result<()>>>,
    attempt: Option<JoinHandle<()>>,
    timeout_timer: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    connection: Option<Connection>,
    /// Stream from a finished attempt, until the machine adopts it.
    arrived: Option<(u64, IpcStream)>,
    /// Adopted connection, started once the current input is handled.
    staged: Option<Staged>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        loop {
            let input = tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = rx.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            if let Input::Close(ack) = input {
                self.apply_all(LifecycleEvent::Close);
                self.publish_state();
                let _ = ack.send(());
                break;
            }
            self.handle(input);
            self.publish_state();
        }
        self.shutdown();
    }

    fn handle(&mut self, input: Input) {
        let event = match input {
            Input::Connect(reply) => {
                let mut reply = Some(reply);
                for action in self.machine.handle(LifecycleEvent::Connect) {
                    match action {
                        Action::Reject(err) => {
                            if let Some(reply) = reply.take() {
                                let _ = reply.send(Err(err));
                            }
                        }
                        other => self.apply(other),
                    }
                }
                if reply.is_some() {
                    info!(address = %self.address, "connecting");
                    self.outcome = reply;
                }
                return;
            }
            Input::Close(_) => return,
            Input::AttemptFinished { epoch, result } => match result {
                Ok(stream) => {
                    self.arrived = Some((epoch, stream));
                    LifecycleEvent::AttemptSucceeded { epoch }
                }
                Err(err) => {
                    debug!(address = %self.address, error = %err, "connection attempt failed");
                    LifecycleEvent::AttemptFailed {
                        epoch,
                        error: err.into(),
                    }
                }
            },
            Input::TimedOut { epoch } => LifecycleEvent::TimedOut { epoch },
            Input::RetryDue { epoch } => LifecycleEvent::RetryDue { epoch },
            Input::ConnectionEnded { epoch, end } => {
                let error = match end {
                    ConnectionEnd::Failed(err) => Some(err),
                    ConnectionEnd::Eof | ConnectionEnd::Cancelled => None,
                };
                LifecycleEvent::ConnectionLost { epoch, error }
            }
        };
        self.apply_all(event);
    }

    fn apply_all(&mut self, event: LifecycleEvent) {
        for action in self.machine.handle(event) {
            self.apply(action);
        }
        if let Some((epoch, _)) = self.arrived.take() {
            debug!(epoch, "discarding stream from superseded attempt");
        }
        self.launch_staged();
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::StartAttempt { epoch } => {
                abort(&mut self.attempt);
                let address = self.address.clone();
                let inputs = self.inputs.clone();
                self.attempt = Some(tokio::spawn(async move {
                    let result = sockbus_transport::connect(&address).await;
                    let _ = inputs.send(Input::AttemptFinished { epoch, result });
                }));
            }
            Action::ArmTimeout { epoch, after } => {
                abort(&mut self.timeout_timer);
                self.timeout_timer = Some(self.after(after, Input::TimedOut { epoch }));
            }
            Action::AbortAttempt => abort(&mut self.attempt),
            Action::CancelTimers => {
                abort(&mut self.timeout_timer);
                abort(&mut self.retry_timer);
            }
            Action::ScheduleRetry { epoch, after } => {
                info!(
                    address = %self.address,
                    delay_ms = after.as_millis() as u64,
                    "reconnect scheduled"
                );
                abort(&mut self.retry_timer);
                self.retry_timer = Some(self.after(after, Input::RetryDue { epoch }));
            }
            Action::Activate { epoch } => self.activate(epoch),
            Action::Deactivate => self.deactivate(),
            Action::NotifyOutcome(outcome) => {
                if let Some(reply) = self.outcome.take() {
                    // The caller may act on the state as soon as it wakes.
                    self.publish_state();
                    let _ = reply.send(outcome);
                }
            }
            Action::Reject(err) => debug!(error = %err, "unexpected rejection"),
            Action::Emit(Notice::Connected) => {
                if let Some(connection) = &self.connection {
                    self.events.send(Event::Connect(connection.peer.clone()));
                }
            }
            Action::Emit(Notice::Closed) => {
                info!(address = %self.address, "client closed");
                self.events.send(Event::Close);
            }
            Action::Emit(Notice::Error(err)) => self.events.error(err),
        }
    }

    fn after(&self, delay: Duration, input: Input) -> JoinHandle<()> {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(input);
        })
    }

    fn activate(&mut self, epoch: u64) {
        let Some((arrived_epoch, stream)) = self.arrived.take() else {
            warn!(epoch, "activation without a connected stream");
            return;
        };
        if arrived_epoch != epoch {
            warn!(epoch, arrived_epoch, "activation epoch mismatch");
            return;
        }

        let cancel = self.cancel.child_token();
        let (peer, outbound) =
            PeerHandle::new(self.peer_ids.next(), stream.peer_label(), cancel.clone());
        info!(address = %self.address, peer = %peer.id(), "connected");

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(peer.clone());
        self.connection = Some(Connection {
            peer: peer.clone(),
            cancel: cancel.clone(),
        });
        self.staged = Some(Staged {
            epoch,
            stream,
            peer,
            outbound,
            cancel,
        });
    }

    /// Start the reader/writer for a freshly adopted connection. Runs after
    /// the `connect` event is queued so no message can overtake it.
    fn launch_staged(&mut self) {
        let Some(staged) = self.staged.take() else {
            return;
        };
        let events = self.events.clone();
        let inputs = self.inputs.clone();
        let config = self.frame_config;
        tokio::spawn(async move {
            let Staged {
                epoch,
                stream,
                peer,
                outbound,
                cancel,
            } = staged;
            let end = connection::run(stream, peer, outbound, events, config, cancel).await;
            let _ = inputs.send(Input::ConnectionEnded { epoch, end });
        });
    }

    fn deactivate(&mut self) {
        self.staged = None;
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(connection) = self.connection.take() {
            debug!(peer = %connection.peer.id(), "closing connection");
            connection.cancel.cancel();
        }
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        let settled = state == LifecycleState::Disconnected
            && !self.machine.retry_pending()
            && self.outcome.is_none();
        self.settled.store(settled, Ordering::Release);
        self.state_tx.send_replace(state);
    }

    fn shutdown(&mut self) {
        abort(&mut self.attempt);
        abort(&mut self.timeout_timer);
        abort(&mut self.retry_timer);
        self.deactivate();
        if let Some(reply) = self.outcome.take() {
            let _ = reply.send(Err(EndpointError::Closed));
        }
        self.settled.store(true, Ordering::Release);
        self.state_tx.send_replace(LifecycleState::Disconnected);
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}
