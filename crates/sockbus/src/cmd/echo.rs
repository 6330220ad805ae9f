use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sockbus_endpoint::{Endpoint, Event, PeerHandle};
use sockbus_mediator::PatternMediator;
use tokio::sync::Notify;

use crate::cmd::listen::ALL_TOPICS;
use crate::cmd::{shutdown_signal, EchoArgs};
use crate::exit::{endpoint_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub async fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = args.address.server_config()?;
    let endpoint = Endpoint::with_mediator(Arc::new(PatternMediator::new()));

    let echoed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Notify::new());
    {
        let echoed = Arc::clone(&echoed);
        let done = Arc::clone(&done);
        let limit = args.count;
        endpoint.on(ALL_TOPICS, move |event: &Event| {
            let Event::Message { topic, data, peer } = event else {
                return;
            };
            if echo(peer, topic, data) {
                let total = echoed.fetch_add(1, Ordering::SeqCst) + 1;
                if limit.is_some_and(|limit| total >= limit) {
                    done.notify_one();
                }
            }
        });
    }
    endpoint.on(sockbus_endpoint::CONNECT, |event: &Event| {
        if let Some(peer) = event.peer() {
            tracing::info!(peer = %peer.id(), remote = peer.label(), "peer connected");
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
        tracing::info!(%address, "echo server listening");
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = done.notified() => {}
    }

    endpoint.close().await;
    tracing::info!(echoed = echoed.load(Ordering::SeqCst), "echo server stopped");
    Ok(SUCCESS)
}

/// Reply to `peer` with the same topic and data.
fn echo(peer: &PeerHandle, topic: &str, data: &serde_json::Value) -> bool {
    tracing::info!(peer = %peer.id(), topic, "echoing message");
    match peer.emit(topic, data) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(peer = %peer.id(), error = %err, "echo failed");
            false
        }
    }
}
