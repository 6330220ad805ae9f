//! Server and reconnecting client in one process over TCP.
//!
//! Run with:
//!   cargo run -p sockbus --example request-reply

use std::time::Duration;

use serde_json::json;
use sockbus::{ClientConfig, Endpoint, Event, ServerConfig};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Endpoint::new();
    server.on("sum", |event: &Event| {
        let Some(peer) = event.peer() else { return };
        let total: i64 = event
            .data_as::<Vec<i64>>()
            .map(|values| values.iter().sum())
            .unwrap_or_default();
        if let Err(err) = peer.emit("sum/result", &total) {
            eprintln!("reply failed: {err}");
        }
    });
    server.listen(ServerConfig::tcp("127.0.0.1", 0)).await?;
    let address = server
        .local_address()
        .ok_or("server has no address")?;
    eprintln!("Server on {address}");

    let client = Endpoint::new();
    let (tx, mut results) = mpsc::unbounded_channel();
    client.on("sum/result", move |event: &Event| {
        let _ = tx.send(event.data_as::<i64>());
    });
    client
        .connect(
            ClientConfig::for_address(&address)
                .with_timeout(Duration::from_secs(2))
                .with_reconnect(Duration::from_millis(250)),
        )
        .await?;

    client.emit("sum", &json!([1, 2, 3, 4]))?;
    if let Some(Some(total)) = results.recv().await {
        println!("sum = {total}");
    }

    client.close().await;
    server.close().await;
    Ok(())
}
