use std::sync::Arc;

/// A registered callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;

/// Wrap a closure as a [`Listener`].
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Topic-keyed publish/subscribe hub.
///
/// Implementations decide how a registration pattern matches a topic. They
/// must invoke matching listeners in registration order and must not hold
/// internal locks while a listener runs, since listeners may register
/// further listeners.
///
/// There is no unsubscribe: every registration lives as long as the
/// mediator. Long-lived processes that register short-lived listeners
/// should route through one stable listener instead.
pub trait Mediator<E>: Send + Sync {
    /// Register `listener` for topics matching `pattern`.
    fn on(&self, pattern: &str, listener: Listener<E>);

    /// Invoke every listener matching `topic`. Returns how many ran.
    fn emit(&self, topic: &str, event: &E) -> usize;

    /// Number of listeners that would run for `topic`.
    fn listener_count(&self, topic: &str) -> usize;
}
