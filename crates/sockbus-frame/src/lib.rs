//! Delimiter-based JSON message framing for sockbus.
//!
//! Every message travels as one JSON object followed by a fixed delimiter:
//!
//! ```text
//! {"topic":"<topic>","data":<value>}<<<EOM\0
//! ```
//!
//! JSON escapes U+0000, so the NUL-terminated delimiter can never appear
//! inside a serialized message. Framing is streaming (bytes accumulate until
//! a delimiter shows up); decoding is atomic per frame, so one corrupt frame
//! never poisons the frames around it.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod message;

#[cfg(feature = "async")]
pub mod framed;

pub use codec::{
    decode_message, encode_message, FrameConfig, FrameSplitter, DEFAULT_MAX_FRAME, DELIMITER,
};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
pub use message::Message;

#[cfg(feature = "async")]
pub use framed::MessageCodec;
