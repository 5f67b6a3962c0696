//! Error types for the persistence layer

use std::fmt;

/// Result type alias for persistence operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while loading or saving the persisted alert set
#[derive(Debug)]
pub enum StorageError {
    /// The backing slot could not be read
    ReadFailed(String),

    /// The backing slot could not be written
    WriteFailed(String),

    /// The persisted payload could not be (de)serialized
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ReadFailed(msg) => write!(f, "failed to read persisted alerts: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "failed to write persisted alerts: {}", msg),
            StorageError::SerializationError(msg) => {
                write!(f, "alert serialization error: {}", msg)
            }
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
