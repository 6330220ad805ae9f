use bytes::{Buf, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Frame terminator. Must never be producible by the JSON serializer.
pub const DELIMITER: &[u8] = b"<<<EOM\0";

/// Default maximum frame body size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Configuration for frame decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum frame body size in bytes. `None` buffers without limit.
    pub max_frame_size: Option<usize>,
}

impl FrameConfig {
    /// Accept frames of any size. A peer that never sends a delimiter can
    /// grow the receive buffer without bound.
    pub fn unbounded() -> Self {
        Self {
            max_frame_size: None,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: Some(DEFAULT_MAX_FRAME),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: ?Sized> {
    topic: &'a str,
    data: &'a T,
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────────────────────────────┬─────────────────────┐
/// │ JSON {"topic": <str>, "data": <value>} │ "<<<EOM" 0x00       │
/// └───────────────────────────────────────┴─────────────────────┘
/// ```
pub fn encode_message<T: Serialize + ?Sized>(topic: &str, data: &T) -> Result<Bytes> {
    if topic.is_empty() {
        return Err(FrameError::EmptyTopic);
    }
    let mut buf = serde_json::to_vec(&Envelope { topic, data }).map_err(FrameError::Encode)?;
    buf.extend_from_slice(DELIMITER);
    Ok(Bytes::from(buf))
}

/// Decode one frame body (without delimiter) into a message.
///
/// The body must be a JSON object with a non-empty string `topic` and a
/// `data` field (which may be `null`).
pub fn decode_message(body: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(body).map_err(FrameError::Decode)?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError::InvalidMessage("frame is not a JSON object"));
    };

    let topic = match fields.remove("topic") {
        Some(Value::String(topic)) if !topic.is_empty() => topic,
        Some(Value::String(_)) => return Err(FrameError::InvalidMessage("empty topic")),
        Some(_) => return Err(FrameError::InvalidMessage("topic is not a string")),
        None => return Err(FrameError::InvalidMessage("missing topic")),
    };
    let data = fields
        .remove("data")
        .ok_or(FrameError::InvalidMessage("missing data"))?;

    Ok(Message { topic, data })
}

/// Incremental delimiter scanner over a receive buffer.
///
/// Remembers how far the buffer has already been searched, so a frame that
/// trickles in over many small chunks is scanned in linear time.
#[derive(Debug, Clone, Default)]
pub struct FrameSplitter {
    scanned: usize,
    config: FrameConfig,
}

impl FrameSplitter {
    pub fn new(config: FrameConfig) -> Self {
        Self { scanned: 0, config }
    }

    /// Split the next complete frame body off the front of `buf`.
    ///
    /// Returns `Ok(None)` if no delimiter has arrived yet. The returned body
    /// may be empty (two adjacent delimiters); callers skip those. On
    /// `FrameTooLarge` the buffered bytes are discarded.
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match find_delimiter(buf, self.scanned) {
            Some(pos) => {
                self.scanned = 0;
                if let Some(max) = self.config.max_frame_size {
                    if pos > max {
                        buf.advance(pos + DELIMITER.len());
                        return Err(FrameError::FrameTooLarge { size: pos, max });
                    }
                }
                let body = buf.split_to(pos).freeze();
                buf.advance(DELIMITER.len());
                Ok(Some(body))
            }
            None => {
                // A delimiter may straddle the end of the buffer.
                self.scanned = buf.len().saturating_sub(DELIMITER.len() - 1);
                if let Some(max) = self.config.max_frame_size {
                    if self.scanned > max {
                        let size = self.scanned;
                        buf.clear();
                        self.scanned = 0;
                        return Err(FrameError::FrameTooLarge { size, max });
                    }
                }
                Ok(None)
            }
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn find_delimiter(haystack: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
        .map(|pos| pos + from)
}
