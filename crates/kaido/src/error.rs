//! Error taxonomy shared by every backend.
//!
//! Backends translate their native errors (OS error codes, SDK errors) into
//! [`FsError`] at their boundary. The registry and [`Location`](crate::Location)
//! layers propagate them verbatim.

use std::io;
use thiserror::Error;

use crate::backend::Capability;

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// File or directory does not exist.
    #[error("does not exist: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a file, found a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Expected a directory, found a file.
    #[error("is not a directory: {0}")]
    NotADirectory(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Backend is read-only.
    #[error("read-only file system: {0}")]
    ReadOnly(String),

    /// Backend lacks an optional capability.
    #[error("{backend} does not support {capability}")]
    Unsupported {
        capability: Capability,
        backend: String,
    },

    /// Operation on the empty (invalid) location.
    #[error("empty path")]
    EmptyPath,

    /// Operation was cancelled through its cancellation token.
    #[error("operation canceled")]
    Canceled,

    /// Backend has been closed.
    #[error("file system closed: {0}")]
    Closed(String),

    /// Malformed name pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Returned by a listing callback to end the listing early.
    ///
    /// Listing entry points swallow it and return `Ok(())`.
    #[error("listing stopped")]
    StopListing,

    /// I/O error with no closer match in the taxonomy.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a ReadOnly error naming the backend.
    pub fn read_only(backend: impl Into<String>) -> Self {
        Self::ReadOnly(backend.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(capability: Capability, backend: impl Into<String>) -> Self {
        Self::Unsupported {
            capability,
            backend: backend.into(),
        }
    }

    /// Create a Closed error naming the backend.
    pub fn closed(backend: impl Into<String>) -> Self {
        Self::Closed(backend.into())
    }

    /// Create an InvalidPattern error.
    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for "does not exist", including the empty location.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) | FsError::EmptyPath => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True if this is an Unsupported error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FsError::Unsupported { .. })
    }

    /// True if the operation was cancelled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, FsError::Canceled)
    }
}

/// Translate OS errors into the taxonomy.
impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        let msg = e.to_string();
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(msg),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(msg),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(msg),
            io::ErrorKind::IsADirectory => FsError::IsADirectory(msg),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(msg),
            io::ErrorKind::ReadOnlyFilesystem => FsError::ReadOnly(msg),
            io::ErrorKind::Unsupported => FsError::Other(msg),
            _ => FsError::Io(e),
        }
    }
}

/// Convert FsError to std::io::Error for `Read`/`Write` implementations.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            FsError::ReadOnly(msg) => io::Error::new(io::ErrorKind::ReadOnlyFilesystem, msg),
            e @ FsError::Unsupported { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, e.to_string())
            }
            FsError::EmptyPath => io::Error::new(io::ErrorKind::NotFound, "empty path"),
            FsError::Canceled => io::Error::new(io::ErrorKind::Interrupted, "operation canceled"),
            FsError::InvalidPattern(msg) | FsError::InvalidPath(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            FsError::Io(e) => e,
            e @ (FsError::Closed(_) | FsError::StopListing | FsError::Other(_)) => {
                io::Error::other(e.to_string())
            }
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
