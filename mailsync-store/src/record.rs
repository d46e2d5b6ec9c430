use chrono::{DateTime, NaiveDate, Utc};
use mailsync_common::{
    DeliveryStatusDetail, EventType, Severity, SubmissionId, webhook::utc_datetime,
};
use serde::{Deserialize, Serialize};

use crate::MimeFileName;

/// Local identifier of a stored event record
///
/// Assigned the first time a record is saved. For file-backed stores it is
/// also the file name (`{id}.bin`), so parsing from a file name rejects
/// anything that is not a plain ULID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventRecordId {
    id: ulid::Ulid,
}

impl EventRecordId {
    /// Parse a record id from a file name like `01ARZ3NDEKTSV4RRFFQ69G5FAV.bin`
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".bin")?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl std::fmt::Display for EventRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Serialize for EventRecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> Deserialize<'de> for EventRecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Identity of a provider event.
///
/// The provider only guarantees event ids to be unique within a UTC calendar
/// day, so the date is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub submission_id: Option<SubmissionId>,
    pub event_id: String,
    pub date: NaiveDate,
}

/// A provider event as stored locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Local id, `None` until the record has been saved
    pub id: Option<EventRecordId>,
    /// Provider event id
    pub event_id: String,
    /// UTC calendar date of the event
    pub date: NaiveDate,
    pub submission_id: Option<SubmissionId>,
    pub event_type: EventType,
    pub severity: Option<Severity>,
    pub recipient: String,
    pub reason: Option<String>,
    pub delivery_status: DeliveryStatusDetail,
    /// Provider message id, as found in the message headers
    pub message_id: String,
    /// Provider storage URL of the message, valid for about three days
    pub storage_url: Option<String>,
    pub storage_key: Option<String>,
    pub tags: Vec<String>,
    /// Epoch seconds, fractional
    pub timestamp: f64,

    /// Set once the message has been resent for this event
    pub resubmitted: bool,
    /// Set when the provider later reported the message as delivered
    pub failed_then_delivered: bool,
    /// Cached copy of the original message
    pub mime_file: Option<MimeFileName>,
}

impl EventRecord {
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            submission_id: self.submission_id,
            event_id: self.event_id.clone(),
            date: self.date,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.event_type, EventType::Failed)
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.event_type, EventType::Rejected)
    }

    #[must_use]
    pub const fn is_failure_or_rejected(&self) -> bool {
        self.event_type.is_failure_or_rejected()
    }

    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.event_type, EventType::Delivered)
    }

    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self.event_type, EventType::Accepted)
    }

    /// Opened, clicked, unsubscribed or complained
    #[must_use]
    pub const fn is_user_event(&self) -> bool {
        self.event_type.is_user_action()
    }

    #[must_use]
    pub fn utc_datetime(&self) -> Option<DateTime<Utc>> {
        utc_datetime(self.timestamp)
    }

    /// Seconds elapsed between the event and `now`.
    ///
    /// `None` when the record carries no timestamp.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.timestamp.abs() < f64::EPSILON {
            return None;
        }

        self.utc_datetime()
            .map(|at| now.signed_duration_since(at).num_seconds())
    }

    /// The event time formatted as RFC 2822, in UTC.
    #[must_use]
    pub fn display_time(&self) -> String {
        self.utc_datetime()
            .map(|at| at.to_rfc2822())
            .unwrap_or_default()
    }

    /// Whether this record belongs to the given submission and recipient pair
    #[must_use]
    pub fn same_recipient(&self, submission_id: Option<SubmissionId>, recipient: &str) -> bool {
        self.submission_id == submission_id && self.recipient.eq_ignore_ascii_case(recipient)
    }
}
