use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use sockbus_mediator::Mediator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::EndpointError;
use crate::event::Event;

/// Sending half of an endpoint's event queue.
///
/// Connection tasks, the accept loop and the client driver all report
/// through a sink. Events reach listeners in the order they were sent.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event dropped after dispatcher shut down");
        }
    }

    pub(crate) fn error(&self, err: EndpointError) {
        self.send(Event::error(err));
    }
}

/// Start the task that hands queued events to the mediator.
///
/// Listeners run one at a time on this task. A panicking listener is
/// logged and skipped. The task ends once every sink has been dropped and
/// the queue is empty.
pub(crate) fn spawn_dispatcher(mediator: Arc<dyn Mediator<Event>>) -> (EventSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            dispatch(mediator.as_ref(), &event);
        }
        trace!("dispatcher finished");
    });
    (EventSink { tx }, task)
}

fn dispatch(mediator: &dyn Mediator<Event>, event: &Event) {
    let topic = event.topic();
    match catch_unwind(AssertUnwindSafe(|| mediator.emit(topic, event))) {
        Ok(0) => {
            if let Event::Error(err) = event {
                warn!(error = %err, "unhandled endpoint error");
            } else {
                trace!(topic, "no listeners");
            }
        }
        Ok(count) => trace!(topic, listeners = count, "event dispatched"),
        Err(_) => warn!(topic, "listener panicked"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sockbus_mediator::{listener, TopicMediator};

    use super::*;

    #[tokio::test]
    async fn delivers_in_order_and_survives_panics() {
        let mediator = Arc::new(TopicMediator::<Event>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        mediator.on("close", listener(|_: &Event| panic!("listener bug")));
        {
            let seen = Arc::clone(&seen);
            mediator.on(
                "error",
                listener(move |e: &Event| {
                    let text = e.as_error().map(ToString::to_string).unwrap_or_default();
                    seen.lock().unwrap().push(text);
                }),
            );
        }

        let (sink, task) = spawn_dispatcher(mediator);
        sink.error(EndpointError::NotConnected);
        sink.send(Event::Close);
        sink.error(EndpointError::Closed);
        drop(sink);
        task.await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["not connected".to_string(), "endpoint closed".to_string()]
        );
    }
}
