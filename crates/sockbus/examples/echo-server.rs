//! Echo server: replies to every message on the topic it arrived on.
//!
//! Run with:
//!   cargo run -p sockbus --example echo-server
//!
//! In another terminal:
//!   cargo run -p sockbus --features cli -- send greet \
//!     --path /tmp/sockbus-echo.sock --json '{"hello":"world"}' --wait greet

use std::sync::Arc;

use sockbus::mediator::PatternMediator;
use sockbus::{Endpoint, Event, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::temp_dir().join("sockbus-echo.sock");
    let server = Endpoint::with_mediator(Arc::new(PatternMediator::new()));

    server
        .on("connect", |event: &Event| {
            if let Some(peer) = event.peer() {
                eprintln!("Peer connected: {} ({})", peer.id(), peer.label());
            }
        })
        .on("disconnect", |event: &Event| {
            if let Some(peer) = event.peer() {
                eprintln!("Peer disconnected: {}", peer.id());
            }
        })
        .on("**", |event: &Event| {
            if let Event::Message { topic, data, peer } = event {
                eprintln!("Received {topic} from {}", peer.id());
                if let Err(err) = peer.emit(topic, data) {
                    eprintln!("Echo failed: {err}");
                }
            }
        });

    server.listen(ServerConfig::unix(&path)).await?;
    eprintln!("Listening on {}", path.display());

    tokio::signal::ctrl_c().await?;
    server.close().await;
    Ok(())
}
