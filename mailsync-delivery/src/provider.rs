//! The provider API as seen by this crate
//!
//! Talking HTTP to Mailgun is left to the embedding application; everything
//! here goes through [`MailgunApi`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsync_common::{EventType, RawEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SendOptions, SendParameters};

/// Errors reported by a [`MailgunApi`] implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never got a response (connection refused, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Stored content or a resource no longer exists (e.g. an expired storage URL).
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Returns `true` for failures that may succeed when retried.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Response to an accepted send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    /// Provider message id, usually wrapped in angle brackets
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Filter for the provider events API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub begin: Option<DateTime<Utc>>,
    pub event: Option<EventType>,
    pub limit: Option<usize>,
    pub message_id: Option<String>,
    pub recipient: Option<String>,
}

impl EventQuery {
    /// Query parameters as sent to the events API.
    #[must_use]
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();

        if let Some(begin) = self.begin {
            query.push(("begin", begin.to_rfc2822()));
        }
        if let Some(event) = self.event {
            query.push(("event", event.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(message_id) = &self.message_id {
            query.push(("message-id", message_id.clone()));
        }
        if let Some(recipient) = &self.recipient {
            query.push(("recipient", recipient.clone()));
        }

        query
    }
}

/// The subset of the Mailgun API used for sending and reconciliation.
#[async_trait]
pub trait MailgunApi: Send + Sync + std::fmt::Debug {
    /// Send a structured message.
    async fn send(
        &self,
        domain: &str,
        params: &SendParameters,
    ) -> Result<SendResponse, ProviderError>;

    /// Send a complete MIME message to exactly `recipients`.
    async fn send_mime(
        &self,
        domain: &str,
        recipients: &[String],
        mime: &[u8],
        options: &SendOptions,
    ) -> Result<SendResponse, ProviderError>;

    /// Fetch the stored MIME content of a message.
    async fn show_mime(&self, storage_url: &str) -> Result<Vec<u8>, ProviderError>;

    /// Query stored events.
    async fn events(&self, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderError>;
}

/// Strip the angle brackets the provider puts around message ids.
#[must_use]
pub fn clean_message_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
