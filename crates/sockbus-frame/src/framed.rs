//! `tokio_util::codec` integration.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{decode_message, encode_message, FrameConfig, FrameSplitter};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Codec for `FramedRead`/`FramedWrite` over a sockbus stream.
///
/// The decoder yields `Result<Message, FrameError>` items so that a corrupt
/// frame surfaces as an item and the stream keeps going. Only stream-level
/// failures (I/O, oversized frame) end the stream.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    splitter: FrameSplitter,
}

impl MessageCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            splitter: FrameSplitter::new(config),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Result<Message>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.splitter.next_frame(src)? {
                Some(body) if body.is_empty() => continue,
                Some(body) => return Ok(Some(decode_message(&body))),
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding partial frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<()> {
        let frame = encode_message(&item.topic, &item.data)?;
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::DELIMITER;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(left, MessageCodec::default());
        let mut reader = FramedRead::new(right, MessageCodec::default());

        let sent = vec![
            Message::new("a", json!(1)),
            Message::new("b", json!({"x": [true, false]})),
            Message::new("c", json!("a longer payload that spans several duplex buffers")),
        ];
        let to_send = sent.clone();
        let writer_task = tokio::spawn(async move {
            for msg in &to_send {
                writer.send(msg).await.unwrap();
            }
        });

        for expected in &sent {
            let got = reader.next().await.unwrap().unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_frame_does_not_end_stream() {
        let (mut left, right) = tokio::io::duplex(1024);
        let mut reader = FramedRead::new(right, MessageCodec::default());

        left.write_all(b"garbage").await.unwrap();
        left.write_all(DELIMITER).await.unwrap();
        left.write_all(&encode_message("ok", &1).unwrap()).await.unwrap();
        drop(left);

        let first = reader.next().await.unwrap().unwrap();
        assert!(matches!(first, Err(FrameError::Decode(_))));
        let second = reader.next().await.unwrap().unwrap().unwrap();
        assert_eq!(second.topic, "ok");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn partial_frame_at_eof_is_discarded() {
        let (mut left, right) = tokio::io::duplex(1024);
        let mut reader = FramedRead::new(right, MessageCodec::default());

        left.write_all(&encode_message("whole", &1).unwrap()).await.unwrap();
        left.write_all(br#"{"topic":"half""#).await.unwrap();
        drop(left);

        let first = reader.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first.topic, "whole");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_ends_stream_with_error() {
        let (mut left, right) = tokio::io::duplex(1024);
        let mut reader = FramedRead::new(
            right,
            MessageCodec::new(FrameConfig {
                max_frame_size: Some(16),
            }),
        );

        left.write_all(&[b'z'; 128]).await.unwrap();
        let item = reader.next().await.unwrap();
        assert!(matches!(item, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn encoder_rejects_empty_topic() {
        let mut codec = MessageCodec::default();
        let mut dst = BytesMut::new();
        let err = codec
            .encode(&Message::new("", json!(1)), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::EmptyTopic));
        assert!(dst.is_empty());
    }
}
