use bytes::BytesMut;

use crate::codec::{decode_message, FrameConfig, FrameSplitter};
use crate::error::Result;
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Per-connection stream decoder.
///
/// Feed it chunks exactly as they come off the socket; it hands back every
/// message completed by that chunk, in order. Per-frame decode failures are
/// returned in place and decoding continues with the next frame.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    splitter: FrameSplitter,
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            splitter: FrameSplitter::new(config),
        }
    }

    /// Append `chunk` and decode every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Message>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            match self.splitter.next_frame(&mut self.buf) {
                Ok(Some(body)) if body.is_empty() => continue,
                Ok(Some(body)) => out.push(decode_message(&body)),
                Ok(None) => break,
                Err(err) => {
                    out.push(Err(err));
                    break;
                }
            }
        }
        out
    }

    /// Bytes buffered while waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.splitter = FrameSplitter::new(*self.splitter.config());
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::codec::{encode_message, DELIMITER};
    use crate::error::FrameError;

    fn sample_messages() -> Vec<(String, Value)> {
        vec![
            ("alpha".to_string(), json!(1)),
            ("beta".to_string(), json!({"nested": {"list": [1, "two", null]}})),
            ("gamma".to_string(), json!("a string with <<<EOM inside")),
            ("delta".to_string(), Value::Null),
            ("épsilon/ünïcode".to_string(), json!(["ä", "漢字", "🦀"])),
        ]
    }

    fn wire_for(messages: &[(String, Value)]) -> Vec<u8> {
        let mut wire = Vec::new();
        for (topic, data) in messages {
            wire.extend_from_slice(&encode_message(topic, data).unwrap());
        }
        wire
    }

    fn decoded(results: Vec<Result<Message>>) -> Vec<(String, Value)> {
        results
            .into_iter()
            .map(|r| {
                let msg = r.expect("frame should decode");
                (msg.topic, msg.data)
            })
            .collect()
    }

    #[test]
    fn feed_single_chunk_with_many_frames() {
        let messages = sample_messages();
        let mut decoder = FrameDecoder::new();
        let out = decoded(decoder.feed(&wire_for(&messages)));
        assert_eq!(out, messages);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn feed_byte_by_byte() {
        let messages = sample_messages();
        let wire = wire_for(&messages);
        let mut decoder = FrameDecoder::new();

        let mut out = Vec::new();
        for byte in &wire {
            out.extend(decoded(decoder.feed(std::slice::from_ref(byte))));
        }
        assert_eq!(out, messages);
    }

    #[test]
    fn feed_is_invariant_under_chunking() {
        let messages = sample_messages();
        let wire = wire_for(&messages);

        // Deterministic pseudo-random split points, many different layouts.
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..200 {
            let mut decoder = FrameDecoder::new();
            let mut out = Vec::new();
            let mut pos = 0;
            while pos < wire.len() {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let len = 1 + (seed as usize % 23);
                let end = (pos + len).min(wire.len());
                out.extend(decoded(decoder.feed(&wire[pos..end])));
                pos = end;
            }
            assert_eq!(out, messages);
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn corrupt_frame_between_valid_frames() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_message("before", &1).unwrap());
        wire.extend_from_slice(b"{this is not json");
        wire.extend_from_slice(DELIMITER);
        wire.extend_from_slice(&encode_message("after", &2).unwrap());

        let mut decoder = FrameDecoder::new();
        let results = decoder.feed(&wire);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().topic, "before");
        assert!(matches!(results[1], Err(FrameError::Decode(_))));
        assert_eq!(results[2].as_ref().unwrap().topic, "after");
    }

    #[test]
    fn frame_without_topic_is_an_error() {
        let mut wire = br#"{"data": 5}"#.to_vec();
        wire.extend_from_slice(DELIMITER);

        let mut decoder = FrameDecoder::new();
        let results = decoder.feed(&wire);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(FrameError::InvalidMessage("missing topic"))
        ));
    }

    #[test]
    fn empty_frames_are_skipped() {
        let mut wire = DELIMITER.to_vec();
        wire.extend_from_slice(DELIMITER);
        wire.extend_from_slice(&encode_message("only", &true).unwrap());

        let mut decoder = FrameDecoder::new();
        let out = decoded(decoder.feed(&wire));
        assert_eq!(out, vec![("only".to_string(), json!(true))]);
    }

    #[test]
    fn chunk_without_delimiter_is_buffered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(br#"{"topic":"t","da"#).is_empty());
        assert_eq!(decoder.buffered(), 16);
        assert!(decoder.feed(br#"ta":3}"#).is_empty());

        let out = decoded(decoder.feed(DELIMITER));
        assert_eq!(out, vec![("t".to_string(), json!(3))]);
    }

    #[test]
    fn oversized_buffer_reports_error() {
        let mut decoder = FrameDecoder::with_config(FrameConfig {
            max_frame_size: Some(32),
        });
        let results = decoder.feed(&[b'x'; 64]);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FrameError::FrameTooLarge { .. })));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"{\"topic\":\"lost\"");
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);

        let out = decoded(decoder.feed(&encode_message("kept", &0).unwrap()));
        assert_eq!(out, vec![("kept".to_string(), json!(0))]);
    }
}
