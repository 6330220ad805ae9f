/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Messages must carry a non-empty topic.
    #[error("message topic must not be empty")]
    EmptyTopic,

    /// The frame body is not valid JSON.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame body is JSON but not a valid message envelope.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// Buffered bytes exceed the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors confined to a single frame; the stream stays usable.
    pub fn is_decode(&self) -> bool {
        matches!(self, FrameError::Decode(_) | FrameError::InvalidMessage(_))
    }

    /// True for errors raised while producing a frame.
    pub fn is_encode(&self) -> bool {
        matches!(self, FrameError::Encode(_) | FrameError::EmptyTopic)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
