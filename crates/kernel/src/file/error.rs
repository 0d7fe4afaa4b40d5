//! Error types for media field file handling.

use std::fmt;

use thiserror::Error;

/// Errors reported by a [`FileStore`](super::FileStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entry does not exist.
    #[error("no file store entry at '{path}'")]
    NotFound { path: String },

    /// The destination of a create or move is already taken.
    #[error("file store entry already exists at '{path}'")]
    AlreadyExists { path: String },

    /// The path escapes the store root or is otherwise unusable.
    #[error("invalid file store path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// Underlying I/O failure.
    #[error("file store I/O failed at '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Wrap an I/O error, mapping `NotFound` and `AlreadyExists` to their variants.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error means the entry is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The reconciliation phase an operation belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Deleting uploads that were discarded before saving.
    Discard,
    /// Moving removed files into the trash folder.
    Trash,
    /// Moving new uploads into the content item folder.
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discard => "discard",
            Self::Trash => "trash",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the limited editor file handling.
#[derive(Debug, Error)]
pub enum FileHandlingError {
    /// A file the submission refers to does not exist.
    #[error("can't find the file for '{path}'")]
    NotFound { path: String },

    /// Malformed input, such as a content item id of the wrong length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A storage operation failed.
    #[error("storage operation failed")]
    Storage(#[from] StoreError),

    /// A per-file task panicked or was cancelled.
    #[error("unexpected failure: {0}")]
    Unexpected(String),

    /// More than one operation in a phase failed.
    #[error("{} operations failed during the {phase} phase", failures.len())]
    Phase {
        phase: Phase,
        failures: Vec<FileHandlingError>,
    },
}

impl FileHandlingError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
