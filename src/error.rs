//! Error types for the chainidx storage engine.

use std::io;

/// The result type used throughout chainidx.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for chainidx operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while opening, reading or writing a file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// On-disk data does not match the index layout.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The index metadata could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bucket 7 used size 9000");
        assert_eq!(err.to_string(), "Data corruption: bucket 7 used size 9000");

        let err = Error::invalid_argument("key too long");
        assert_eq!(err.to_string(), "Invalid argument: key too long");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
