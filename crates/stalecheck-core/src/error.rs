//! Error types for checking, hashing and persistence.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::HashBackend;

/// Errors that can occur while checking files or folders.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found (possibly removed mid-check).
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path is not valid UTF-8 and cannot be used as a store key.
    #[error("Path is not valid UTF-8: {path}")]
    NonUtf8Path { path: PathBuf },

    /// Folder root is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Directory traversal failed.
    #[error("Walk error at {path}: {message}")]
    Walk { path: PathBuf, message: String },

    /// Traversal was cancelled; nothing was persisted.
    #[error("Check cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Hash backend failure.
    #[error(transparent)]
    Backend(#[from] HashError),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors from hash backends.
#[derive(Debug, Error)]
pub enum HashError {
    /// Backend construction failed.
    #[error("Hash backend '{backend}' failed to initialize: {message}")]
    InitFailed { backend: HashBackend, message: String },

    /// The wait for backend readiness was aborted.
    #[error("Hash backend '{backend}' initialization was cancelled")]
    InitCancelled { backend: HashBackend },

    /// A previous initialization failed; the backend must be reselected.
    #[error("Hash backend '{backend}' is unavailable after a failed initialization")]
    Unavailable { backend: HashBackend },

    /// No backend with that name.
    #[error("Unknown hash backend: {name}")]
    UnknownBackend { name: String },
}

/// Errors from persisting record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing or renaming the store file failed.
    #[error("Failed to write store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the records failed.
    #[error("Failed to encode store {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
