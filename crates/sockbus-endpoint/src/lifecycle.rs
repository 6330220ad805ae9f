//! Client connection state machine.
//!
//! [`Lifecycle`] is pure: it consumes [`LifecycleEvent`]s and returns the
//! [`Action`]s the driver must carry out. Every attempt, timeout and retry
//! is tagged with the epoch current when it was started; inputs carrying an
//! older epoch are ignored, so a timer that fires after the state it was
//! armed for has been left cannot act twice.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::EndpointError;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Disconnected,
    Connecting,
    Connected,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum LifecycleEvent {
    /// The application asked to connect.
    Connect,
    AttemptSucceeded { epoch: u64 },
    AttemptFailed { epoch: u64, error: EndpointError },
    TimedOut { epoch: u64 },
    /// The established connection ended. `error` is set if it failed
    /// rather than being closed by the remote side.
    ConnectionLost { epoch: u64, error: Option<EndpointError> },
    RetryDue { epoch: u64 },
    /// The application closed the client.
    Close,
}

/// Lifecycle notifications for listeners.
#[derive(Debug)]
pub enum Notice {
    Connected,
    Closed,
    Error(EndpointError),
}

/// Side effects requested by the state machine, in execution order.
#[derive(Debug)]
pub enum Action {
    StartAttempt { epoch: u64 },
    ArmTimeout { epoch: u64, after: Duration },
    /// Abandon the in-flight attempt, if any.
    AbortAttempt,
    /// Cancel the pending timeout and retry timers.
    CancelTimers,
    ScheduleRetry { epoch: u64, after: Duration },
    /// Adopt the stream produced by attempt `epoch` as the live connection.
    Activate { epoch: u64 },
    /// Tear down the live connection.
    Deactivate,
    /// Resolve the pending `connect` call.
    NotifyOutcome(Result<(), EndpointError>),
    /// Refuse the `Connect` request that was just handled.
    Reject(EndpointError),
    Emit(Notice),
}

/// The client connection state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    epoch: u64,
    timeout: Duration,
    reconnect: Option<Duration>,
    reconnect_enabled: bool,
    outcome_pending: bool,
    retry_pending: bool,
    closed: bool,
}

impl Lifecycle {
    /// `reconnect` is the retry interval, `None` to never retry.
    pub fn new(timeout: Duration, reconnect: Option<Duration>) -> Self {
        Self {
            state: LifecycleState::Disconnected,
            epoch: 0,
            timeout,
            reconnect,
            reconnect_enabled: reconnect.is_some(),
            outcome_pending: false,
            retry_pending: false,
            closed: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect_enabled
    }

    /// True while a retry timer is armed.
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Action> {
        use LifecycleState::{Connected, Connecting, Disconnected};

        trace!(state = self.state.as_str(), epoch = self.epoch, ?event, "lifecycle input");
        match event {
            LifecycleEvent::Connect => self.on_connect(),
            LifecycleEvent::AttemptSucceeded { epoch } if self.is_current(epoch, Connecting) => {
                self.on_attempt_succeeded()
            }
            LifecycleEvent::AttemptFailed { epoch, error }
                if self.is_current(epoch, Connecting) =>
            {
                self.on_attempt_failed(error)
            }
            LifecycleEvent::TimedOut { epoch } if self.is_current(epoch, Connecting) => {
                self.on_timed_out()
            }
            LifecycleEvent::ConnectionLost { epoch, error }
                if self.is_current(epoch, Connected) =>
            {
                self.on_connection_lost(error)
            }
            LifecycleEvent::RetryDue { epoch }
                if self.retry_pending && self.is_current(epoch, Disconnected) =>
            {
                self.retry_pending = false;
                self.start_attempt()
            }
            LifecycleEvent::Close => self.on_close(),
            stale => {
                debug!(
                    state = self.state.as_str(),
                    epoch = self.epoch,
                    ?stale,
                    "ignoring stale lifecycle input"
                );
                Vec::new()
            }
        }
    }

    fn is_current(&self, epoch: u64, state: LifecycleState) -> bool {
        self.epoch == epoch && self.state == state
    }

    fn on_connect(&mut self) -> Vec<Action> {
        if self.state != LifecycleState::Disconnected || self.retry_pending {
            let reason = if self.retry_pending {
                "reconnect already scheduled".to_string()
            } else {
                format!("already {}", self.state.as_str())
            };
            return vec![Action::Reject(EndpointError::InvalidState(reason))];
        }
        self.closed = false;
        self.reconnect_enabled = self.reconnect.is_some();
        self.outcome_pending = true;
        self.start_attempt()
    }

    fn on_attempt_succeeded(&mut self) -> Vec<Action> {
        self.state = LifecycleState::Connected;
        let mut actions = vec![Action::CancelTimers, Action::Activate { epoch: self.epoch }];
        if let Some(outcome) = self.take_outcome(Ok(())) {
            actions.push(outcome);
        }
        actions.push(Action::Emit(Notice::Connected));
        actions
    }

    fn on_attempt_failed(&mut self, error: EndpointError) -> Vec<Action> {
        let mut actions = vec![Action::Emit(Notice::Error(error))];
        if self.reconnect_enabled {
            self.state = LifecycleState::Disconnected;
            actions.extend([Action::CancelTimers, Action::AbortAttempt]);
            actions.push(self.schedule_retry());
        }
        // Without reconnect the armed timeout decides the outcome.
        actions
    }

    fn on_timed_out(&mut self) -> Vec<Action> {
        self.state = LifecycleState::Disconnected;
        let mut actions = vec![Action::AbortAttempt, Action::CancelTimers];
        let timeout = EndpointError::ConnectionTimeout(self.timeout);
        if self.reconnect_enabled {
            actions.push(Action::Emit(Notice::Error(timeout)));
            actions.push(self.schedule_retry());
        } else if let Some(outcome) = self.take_outcome(Err(timeout)) {
            actions.push(outcome);
        } else {
            actions.push(Action::Emit(Notice::Error(EndpointError::ConnectionTimeout(
                self.timeout,
            ))));
        }
        actions
    }

    fn on_connection_lost(&mut self, error: Option<EndpointError>) -> Vec<Action> {
        self.state = LifecycleState::Disconnected;
        let mut actions = vec![Action::CancelTimers, Action::Deactivate];
        if let Some(error) = error {
            actions.push(Action::Emit(Notice::Error(error)));
        }
        if self.reconnect_enabled {
            actions.push(self.schedule_retry());
        } else {
            self.closed = true;
            actions.push(Action::Emit(Notice::Closed));
        }
        actions
    }

    fn on_close(&mut self) -> Vec<Action> {
        self.reconnect_enabled = false;
        self.retry_pending = false;
        self.epoch += 1;
        self.state = LifecycleState::Disconnected;
        let mut actions = vec![Action::CancelTimers, Action::AbortAttempt, Action::Deactivate];
        if let Some(outcome) = self.take_outcome(Err(EndpointError::Closed)) {
            actions.push(outcome);
        }
        if !self.closed {
            self.closed = true;
            actions.push(Action::Emit(Notice::Closed));
        }
        actions
    }

    fn start_attempt(&mut self) -> Vec<Action> {
        self.epoch += 1;
        self.state = LifecycleState::Connecting;
        vec![
            Action::StartAttempt { epoch: self.epoch },
            Action::ArmTimeout {
                epoch: self.epoch,
                after: self.timeout,
            },
        ]
    }

    fn schedule_retry(&mut self) -> Action {
        self.epoch += 1;
        self.retry_pending = true;
        Action::ScheduleRetry {
            epoch: self.epoch,
            after: self.reconnect.unwrap_or_default(),
        }
    }

    fn take_outcome(&mut self, outcome: Result<(), EndpointError>) -> Option<Action> {
        if std::mem::take(&mut self.outcome_pending) {
            Some(Action::NotifyOutcome(outcome))
        } else {
            None
        }
    }
}
