//! Error types for fileshare.

use std::io;

use thiserror::Error;

/// Common error type for fileshare.
#[derive(Error, Debug)]
pub enum FileShareError {
    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A directory was expected but something else occupies the path.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file was expected but the path is a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The target name is already taken.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A single upload is larger than the configured limit.
    #[error("too large: {0}")]
    TooLarge(String),

    /// Name collision could not be resolved within the retry budget.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FileShareError {
    /// Classify an I/O error raised while operating on `what`.
    ///
    /// Kinds with a dedicated variant are mapped onto it; everything else is
    /// kept as a transient [`FileShareError::Io`].
    pub fn from_io(err: io::Error, what: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileShareError::NotFound(what.into()),
            io::ErrorKind::PermissionDenied => FileShareError::PermissionDenied(what.into()),
            io::ErrorKind::AlreadyExists => FileShareError::AlreadyExists(what.into()),
            _ => FileShareError::Io(err),
        }
    }
}

/// Result type alias for fileshare operations.
pub type Result<T> = std::result::Result<T, FileShareError>;
