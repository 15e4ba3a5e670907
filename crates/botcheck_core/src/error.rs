use crate::InvalidEvent;

/// Errors surfaced to stream observers. None of them stop the stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("Received invalid progress data from server: {0}")]
    Validation(#[from] InvalidEvent),
    #[error("Connection failed: {0}")]
    Transport(String),
    #[error("Failed to connect after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
    #[error("Storage unavailable: {0}")]
    Storage(String),
}

impl StreamError {
    /// Whether automatic recovery may still clear this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StreamError::ExhaustedRetries { .. })
    }
}
