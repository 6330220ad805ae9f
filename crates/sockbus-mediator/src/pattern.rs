use std::sync::{PoisonError, RwLock};

use tracing::warn;

use crate::error::{MediatorError, Result};
use crate::mediator::{Listener, Mediator};

const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one non-empty segment.
    Single,
    /// `**` (final segment only): one or more remaining segments.
    Rest,
}

/// A compiled topic pattern.
///
/// Topics are split on `/`. A pattern segment is either a literal, `*`
/// (any single non-empty segment) or, as the last segment only, `**` (one
/// or more trailing segments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason| MediatorError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let parts: Vec<&str> = pattern.split(SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if idx == last => Segment::Rest,
                "**" => return Err(invalid("'**' is only allowed as the final segment")),
                "*" => Segment::Single,
                literal if literal.contains('*') => {
                    return Err(invalid("wildcards must fill a whole segment"))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Whether `topic` matches this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split(SEPARATOR).collect();
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest => return parts.len() > idx,
                Segment::Single => match parts.get(idx) {
                    Some(part) if !part.is_empty() => {}
                    _ => return false,
                },
                Segment::Literal(literal) => {
                    if parts.get(idx) != Some(&literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.len() == self.segments.len()
    }

    /// True if the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Wildcard-matching mediator.
///
/// Listeners run in registration order across all patterns that match.
pub struct PatternMediator<E> {
    listeners: RwLock<Vec<(Pattern, Listener<E>)>>,
}

impl<E> PatternMediator<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener, reporting an invalid pattern instead of
    /// skipping it.
    pub fn try_on(&self, pattern: &str, listener: Listener<E>) -> Result<()> {
        let compiled = Pattern::parse(pattern)?;
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((compiled, listener));
        Ok(())
    }

    fn matching(&self, topic: &str) -> Vec<Listener<E>> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners
            .iter()
            .filter(|(pattern, _)| pattern.matches(topic))
            .map(|(_, listener)| Listener::clone(listener))
            .collect()
    }
}

impl<E> Default for PatternMediator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Mediator<E> for PatternMediator<E> {
    fn on(&self, pattern: &str, listener: Listener<E>) {
        if let Err(err) = self.try_on(pattern, listener) {
            warn!(error = %err, "listener not registered");
        }
    }

    fn emit(&self, topic: &str, event: &E) -> usize {
        let matched = self.matching(topic);
        for listener in &matched {
            listener(event);
        }
        matched.len()
    }

    fn listener_count(&self, topic: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners
            .iter()
            .filter(|(pattern, _)| pattern.matches(topic))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::mediator::listener;

    #[test]
    fn literal_pattern() {
        let p = Pattern::parse("sensors/temp").unwrap();
        assert!(p.is_exact());
        assert!(p.matches("sensors/temp"));
        assert!(!p.matches("sensors/temp/1"));
        assert!(!p.matches("sensors"));
    }

    #[test]
    fn single_segment_wildcard() {
        let p = Pattern::parse("sensors/*/value").unwrap();
        assert!(!p.is_exact());
        assert!(p.matches("sensors/t1/value"));
        assert!(!p.matches("sensors//value"));
        assert!(!p.matches("sensors/t1/x/value"));
        assert!(!p.matches("sensors/t1"));
    }

    #[test]
    fn trailing_rest_wildcard() {
        let p = Pattern::parse("logs/**").unwrap();
        assert!(p.matches("logs/app"));
        assert!(p.matches("logs/app/error/42"));
        assert!(!p.matches("logs"));
        assert!(!p.matches("metrics/app"));
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("a/**/b").is_err());
        assert!(Pattern::parse("a/b*").is_err());
    }

    #[test]
    fn emits_in_registration_order_across_patterns() {
        let mediator = PatternMediator::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for pattern in ["jobs/**", "jobs/*/done", "jobs/7/done", "other"] {
            let seen = Arc::clone(&seen);
            mediator.on(
                pattern,
                listener(move |_: &&'static str| seen.lock().unwrap().push(pattern)),
            );
        }

        assert_eq!(mediator.emit("jobs/7/done", &"payload"), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["jobs/**", "jobs/*/done", "jobs/7/done"]
        );
        assert_eq!(mediator.listener_count("jobs/1/done"), 2);
        assert_eq!(mediator.listener_count("nothing"), 0);
    }

    #[test]
    fn invalid_pattern_is_skipped_by_on() {
        let mediator = PatternMediator::<()>::new();
        mediator.on("a/**/b", listener(|_: &()| {}));
        assert_eq!(mediator.listener_count("a/x/b"), 0);

        let err = mediator
            .try_on("a/**/b", listener(|_: &()| {}))
            .unwrap_err();
        assert!(matches!(err, MediatorError::InvalidPattern { .. }));
    }

    #[test]
    fn reserved_lifecycle_topics_match_literally() {
        let mediator = PatternMediator::<()>::new();
        mediator.on("error", listener(|_: &()| {}));
        assert_eq!(mediator.emit("error", &()), 1);
        assert_eq!(mediator.emit("error/extra", &()), 0);
    }
}
