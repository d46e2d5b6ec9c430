//! Provider event vocabulary
//!
//! Mailgun reports the lifecycle of every message it handles as a stream of
//! events, one per recipient. The types here describe those events in the
//! form they are stored locally.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The kind of event reported by the provider.
///
/// Unknown event strings map to [`EventType::Unknown`] rather than failing, so
/// new provider event types never block ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Accepted,
    Rejected,
    Delivered,
    Failed,
    Opened,
    Clicked,
    Unsubscribed,
    Complained,
    Stored,
    #[default]
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Events caused by an action of the recipient.
    pub const USER_ACTIONS: [Self; 4] = [
        Self::Opened,
        Self::Clicked,
        Self::Unsubscribed,
        Self::Complained,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Unsubscribed => "unsubscribed",
            Self::Complained => "complained",
            Self::Stored => "stored",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` for `failed` and `rejected`.
    ///
    /// Rejected messages were never attempted by the provider; failed ones
    /// were attempted and bounced. Both count towards the failure limit.
    #[must_use]
    pub const fn is_failure_or_rejected(self) -> bool {
        matches!(self, Self::Failed | Self::Rejected)
    }

    #[must_use]
    pub const fn is_user_action(self) -> bool {
        matches!(
            self,
            Self::Opened | Self::Clicked | Self::Unsubscribed | Self::Complained
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            "opened" => Self::Opened,
            "clicked" => Self::Clicked,
            "unsubscribed" => Self::Unsubscribed,
            "complained" => Self::Complained,
            "stored" => Self::Stored,
            _ => Self::Unknown,
        })
    }
}

/// Failure severity, only present on `failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The provider has given up on the message.
    Permanent,
    /// The provider will retry delivery on its own.
    Temporary,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        })
    }
}

/// Identifier of a locally initiated send.
///
/// Sends carry this id to the provider as the `s` user variable so that
/// events reported later can be linked back to the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub u64);

impl SubmissionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SMTP level details of a delivery attempt, as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatusDetail {
    /// Short reason text, e.g. "mailbox full"
    pub message: String,
    /// Verbose explanation of the status
    pub description: String,
    /// SMTP reply code, e.g. 550
    pub code: Option<u32>,
    /// Number of delivery attempts made by the provider
    pub attempts: Option<u32>,
    /// Length of the SMTP session in seconds
    pub session_seconds: Option<f64>,
    pub mx_host: String,
}
