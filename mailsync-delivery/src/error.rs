//! Typed error handling for event synchronisation and resubmission.
//!
//! [`SyncError`] is the top-level error. It separates failures that are worth
//! retrying (provider transport problems, scheduling) from ones that are not
//! (storage, missing correlation data, policy refusals).

use mailsync_common::PayloadError;
use mailsync_store::StoreError;
use thiserror::Error;

use crate::{ProviderError, ScheduleError};

/// Top-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The event store failed to read or write.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The record lacks the data needed to correlate it with provider state.
    #[error("Missing correlation data: {0}")]
    MissingCorrelation(String),

    /// Resubmission was refused or failed.
    #[error("Resubmit error: {0}")]
    Resubmit(#[from] ResubmitError),

    /// A provider API call failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A deferred send could not be scheduled.
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// An inbound payload could not be parsed.
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
}

impl SyncError {
    /// Returns `true` if the operation may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(error) => error.is_transport(),
            Self::Schedule(_) => true,
            _ => false,
        }
    }
}

/// Reasons a resubmission did not happen.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResubmitError {
    /// The provider has since reported the message as delivered.
    #[error("Message has already been delivered")]
    AlreadyDelivered,

    #[error("Cannot resubmit: too many failures ({failures}/{max})")]
    LimitExceeded { failures: usize, max: usize },

    /// Neither the provider storage nor the local cache has the message.
    #[error("No message content available to resubmit")]
    NoContentAvailable,

    /// The provider accepted the request but returned no message id.
    #[error("Resend returned no message id")]
    ResendFailed,

    #[error("Event has no recipient to resend to")]
    MissingRecipient,
}

/// Errors reported to an operator resubmitting an event by hand.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManualResubmitError {
    #[error("{0}")]
    Validation(String),
}
