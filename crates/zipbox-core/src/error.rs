//! Error types for zipbox-core

use thiserror::Error;

/// Core error types for the zipbox library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP codec error
    #[error("Zip error: {0}")]
    Zip(String),

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A visitor rejected an entry and aborted the traversal
    #[error("Aborted by visitor: {0}")]
    VisitorAbort(String),

    /// The bytes streamed into a member differ from its declared size
    #[error("Size mismatch for {name}: declared {declared} bytes, wrote {actual}")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entry index outside the session's entry list
    #[error("Index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    /// The session has no archive open for reading
    #[error("No archive is open for reading")]
    NotOpen,

    /// The session was closed
    #[error("Archive session is closed")]
    SessionClosed,

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::Zip(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
