//! Error types for the mailsync-store crate.

use std::io;

use thiserror::Error;

use crate::{EventRecordId, MimeFileName};

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Record not found in the store.
    #[error("Event record not found: {0}")]
    NotFound(EventRecordId),

    /// Cached MIME content not found.
    #[error("MIME file not found: {0}")]
    MimeNotFound(MimeFileName),

    /// Store directory validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),

    /// The configured capacity of a memory store has been reached.
    #[error("Store capacity exceeded: {len}/{capacity} records")]
    CapacityExceeded { len: usize, capacity: usize },
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Store path cannot contain '..' components: {0}")]
    ParentComponent(String),

    #[error("Store path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Store path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: &'static str, path: String },

    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),

    #[error("Invalid MIME file name: {0}")]
    InvalidMimeFileName(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<bincode::error::EncodeError> for StoreError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Serialization(e.into())
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Serialization(e.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
