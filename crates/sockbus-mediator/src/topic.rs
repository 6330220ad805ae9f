use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::mediator::{Listener, Mediator};

/// Exact-match mediator.
pub struct TopicMediator<E> {
    listeners: RwLock<HashMap<String, Vec<Listener<E>>>>,
}

impl<E> TopicMediator<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Topics that have at least one listener.
    pub fn topics(&self) -> Vec<String> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<String> = listeners.keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl<E> Default for TopicMediator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Mediator<E> for TopicMediator<E> {
    fn on(&self, pattern: &str, listener: Listener<E>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(pattern.to_string())
            .or_default()
            .push(listener);
    }

    fn emit(&self, topic: &str, event: &E) -> usize {
        let snapshot = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(topic) {
                Some(found) => found.clone(),
                None => return 0,
            }
        };
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    fn listener_count(&self, topic: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(topic).map_or(0, Vec::len)
    }
}
