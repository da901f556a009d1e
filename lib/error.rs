//! Error types surfaced by the engine.

use std::io;

use thiserror::Error;

use crate::directory::CallbackTarget;

/// Errors returned to callers of a directory handle.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory task has shut down, usually because its last lease was released.
    #[error("directory is closed")]
    Closed,

    /// A callback with the same target and client is already pending.
    #[error("a callback for {target:?} is already registered by this client")]
    DuplicateCallback {
        /// The target the duplicate registration named.
        target: CallbackTarget,
    },

    /// A file name that cannot name an entry inside a directory.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// No child of an aggregate knows the named file.
    #[error("no directory contains {0:?}")]
    UnknownFile(String),
}

/// How a failed backend fetch is recorded against a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The entry does not exist. Terminal: the file is marked gone.
    NotFound,
    /// The entry exists but cannot be read.
    Unreadable,
    /// A value did not fit the type it is stored in.
    TooLarge,
    /// Any other backend failure.
    Other,
}

impl FetchFailure {
    /// Classify a backend error.
    #[must_use]
    pub fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::Unreadable,
            io::ErrorKind::FileTooLarge | io::ErrorKind::InvalidData => Self::TooLarge,
            _ => Self::Other,
        }
    }

    /// Whether the failure means the entry no longer exists.
    #[must_use]
    pub fn is_gone(self) -> bool {
        matches!(self, Self::NotFound)
    }
}
