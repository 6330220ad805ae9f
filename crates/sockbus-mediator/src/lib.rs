//! Pluggable topic-keyed publish/subscribe hubs.
//!
//! A [`Mediator`] maps topic patterns to listeners. Endpoints depend only on
//! the trait; which matching rules apply is up to the implementation:
//!
//! - [`TopicMediator`] — exact topic match (the default)
//! - [`PatternMediator`] — `/`-separated segments with `*` and `**` wildcards

pub mod error;
pub mod mediator;
pub mod pattern;
pub mod topic;

pub use error::{MediatorError, Result};
pub use mediator::{listener, Listener, Mediator};
pub use pattern::{Pattern, PatternMediator};
pub use topic::TopicMediator;
