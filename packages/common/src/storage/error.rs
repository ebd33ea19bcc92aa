use std::fmt;
use std::time::Duration;

/// Errors that can occur while asking object storage about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The request did not complete in time.
    Timeout { object_id: String, after: Duration },
    /// Connection failure or unexpected HTTP status.
    Transport(String),
    /// Storage answered with something that could not be interpreted.
    InvalidResponse(String),
}

impl StorageError {
    /// Timeouts and transport failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { object_id, after } => {
                write!(
                    f,
                    "storage request for {object_id} timed out after {}ms",
                    after.as_millis()
                )
            }
            Self::Transport(msg) => write!(f, "storage transport error: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "invalid storage response: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}
