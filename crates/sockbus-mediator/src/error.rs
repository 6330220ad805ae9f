/// Errors raised while registering listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediatorError {
    /// The topic pattern cannot be compiled.
    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, MediatorError>;
