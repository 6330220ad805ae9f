use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use sockbus_frame::{FrameConfig, MessageCodec};
use sockbus_transport::{IpcStream, TransportError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::EventSink;
use crate::error::EndpointError;
use crate::event::Event;
use crate::peer::PeerHandle;

/// How long a closing connection may spend writing out queued frames.
pub(crate) const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a connection task stopped.
#[derive(Debug)]
pub(crate) enum ConnectionEnd {
    /// The remote side closed the stream.
    Eof,
    /// The endpoint shut the connection down.
    Cancelled,
    /// A stream-level failure; the connection is unusable.
    Failed(EndpointError),
}

/// Drive one connection until it ends.
///
/// Inbound frames become [`Event::Message`]s on `events`. A frame that fails
/// to decode is reported as an error event and reading continues. Outbound
/// frames queued on the peer's handle are written in order.
///
/// Cancellation interrupts a write in progress. What remains of that frame
/// and of the queue gets [`CLOSE_FLUSH_TIMEOUT`] to reach the peer; a peer
/// that stopped reading loses the rest.
pub(crate) async fn run(
    stream: IpcStream,
    peer: PeerHandle,
    mut outbound: mpsc::Receiver<Bytes>,
    events: EventSink,
    config: FrameConfig,
    cancel: CancellationToken,
) -> ConnectionEnd {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut frames = FramedRead::new(reader, MessageCodec::new(config));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush_and_shutdown(&mut writer, None, &mut outbound, &peer).await;
                return ConnectionEnd::Cancelled;
            }
            queued = outbound.recv() => {
                let Some(mut frame) = queued else {
                    return ConnectionEnd::Cancelled;
                };
                let written = tokio::select! {
                    written = writer.write_all_buf(&mut frame) => written,
                    _ = cancel.cancelled() => {
                        flush_and_shutdown(&mut writer, Some(frame), &mut outbound, &peer).await;
                        return ConnectionEnd::Cancelled;
                    }
                };
                if let Err(err) = written {
                    debug!(peer = %peer.id(), error = %err, "write failed");
                    return ConnectionEnd::Failed(TransportError::Io(err).into());
                }
            }
            inbound = frames.next() => match inbound {
                Some(Ok(Ok(message))) => events.send(Event::Message {
                    topic: message.topic,
                    data: message.data,
                    peer: peer.clone(),
                }),
                Some(Ok(Err(err))) => {
                    warn!(peer = %peer.id(), error = %err, "dropping malformed frame");
                    events.error(err.into());
                }
                Some(Err(err)) => {
                    debug!(peer = %peer.id(), error = %err, "read failed");
                    return ConnectionEnd::Failed(err.into());
                }
                None => return ConnectionEnd::Eof,
            },
        }
    }
}

/// Write the unfinished `partial` frame and whatever is still queued, then
/// shut the write half down, all within [`CLOSE_FLUSH_TIMEOUT`].
async fn flush_and_shutdown<W>(
    writer: &mut W,
    partial: Option<Bytes>,
    outbound: &mut mpsc::Receiver<Bytes>,
    peer: &PeerHandle,
) where
    W: AsyncWrite + Unpin,
{
    outbound.close();
    let flush = async {
        if let Some(mut frame) = partial {
            writer.write_all_buf(&mut frame).await?;
        }
        while let Ok(mut frame) = outbound.try_recv() {
            writer.write_all_buf(&mut frame).await?;
        }
        writer.shutdown().await
    };
    match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(peer = %peer.id(), error = %err, "flush on close failed"),
        Err(_) => warn!(peer = %peer.id(), "peer is not reading, dropping queued frames"),
    }
}
