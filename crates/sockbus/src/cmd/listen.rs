use std::sync::Arc;

use sockbus_endpoint::{Endpoint, Event};
use sockbus_mediator::{Pattern, PatternMediator};
use tokio::sync::mpsc;

use crate::cmd::{shutdown_signal, ListenArgs};
use crate::exit::{endpoint_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

/// Matches every topic.
pub(crate) const ALL_TOPICS: &str = "**";

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let filters = compile_filters(&args.topics)?;
    let config = args.address.server_config()?;

    let endpoint = Endpoint::with_mediator(Arc::new(PatternMediator::new()));
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    endpoint.on(ALL_TOPICS, move |event: &Event| {
        if matches!(event, Event::Message { .. }) {
            let _ = tx.send(event.clone());
        }
    });
    endpoint.on(sockbus_endpoint::ERROR, |event: &Event| {
        if let Some(err) = event.as_error() {
            tracing::warn!(error = %err, "endpoint error");
        }
    });

    endpoint
        .listen(config)
        .await
        .map_err(|err| endpoint_error("listen failed", err))?;
    if let Some(address) = endpoint.local_address() {
        tracing::info!(%address, "listening");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if !accepts(&filters, event.topic()) {
            continue;
        }

        print_message(&event, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    endpoint.close().await;
    Ok(SUCCESS)
}

fn compile_filters(topics: &[String]) -> CliResult<Vec<Pattern>> {
    topics
        .iter()
        .map(|topic| {
            Pattern::parse(topic)
                .map_err(|err| CliError::new(USAGE, format!("invalid --topic: {err}")))
        })
        .collect()
}

fn accepts(filters: &[Pattern], topic: &str) -> bool {
    filters.is_empty() || filters.iter().any(|filter| filter.matches(topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_accepts_everything() {
        assert!(accepts(&[], "anything/at/all"));
    }

    #[test]
    fn filters_match_patterns() {
        let filters = compile_filters(&["jobs/*".to_string(), "log/**".to_string()])
            .expect("patterns should compile");
        assert!(accepts(&filters, "jobs/1"));
        assert!(accepts(&filters, "log/app/warn"));
        assert!(!accepts(&filters, "jobs/1/done"));
    }

    #[test]
    fn invalid_filter_is_usage_error() {
        let err = compile_filters(&["a/**/b".to_string()]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
