//! Error types for the mailsync-common crate.

use thiserror::Error;

/// Errors raised while decoding an inbound provider payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The body is not valid JSON, or does not have the expected shape.
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field required to identify the event is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
