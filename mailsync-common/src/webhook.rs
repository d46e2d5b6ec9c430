//! Inbound provider event payloads
//!
//! The same event structure arrives through two paths: pushed to us as a
//! webhook (wrapped in an envelope carrying a signature), or pulled from the
//! events API when polling. [`RawEvent::parse`] accepts either shape.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{EventType, PayloadError, Severity, SubmissionId};

/// User variable carrying the local submission id.
pub const SUBMISSION_VARIABLE: &str = "s";

/// User variable carrying the webhook filter value.
pub const WEBHOOK_FILTER_VARIABLE: &str = "wfv";

/// A webhook body as posted by the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub signature: Option<Value>,
    #[serde(rename = "event-data")]
    pub event_data: RawEvent,
}

/// One provider event, exactly as reported.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEvent {
    /// Provider event id, unique within a UTC calendar day
    #[serde(default)]
    pub id: String,

    /// Epoch seconds, fractional
    #[serde(default)]
    pub timestamp: f64,

    #[serde(default)]
    pub event: EventType,

    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Option<Severity>,

    #[serde(default)]
    pub recipient: String,

    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default, rename = "delivery-status")]
    pub delivery_status: Option<RawDeliveryStatus>,

    #[serde(default)]
    pub storage: Option<RawStorage>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, rename = "user-variables")]
    pub user_variables: Map<String, Value>,

    #[serde(default)]
    pub message: Option<RawMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDeliveryStatus {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub code: Option<u32>,
    #[serde(default, rename = "attempt-no", deserialize_with = "lenient_number")]
    pub attempt_no: Option<u32>,
    #[serde(default, rename = "session-seconds", deserialize_with = "lenient_number")]
    pub session_seconds: Option<f64>,
    #[serde(default, rename = "mx-host")]
    pub mx_host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStorage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMessage {
    #[serde(default)]
    pub headers: Map<String, Value>,
}

impl RawEvent {
    /// Parse a webhook body or a bare event object.
    ///
    /// # Errors
    /// Returns [`PayloadError`] if the body is not JSON of the expected shape
    /// or the event has no id.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;

        let event = if value.get("event-data").is_some() {
            serde_json::from_value::<WebhookEnvelope>(value)?.event_data
        } else {
            serde_json::from_value::<Self>(value)?
        };

        if event.id.trim().is_empty() {
            return Err(PayloadError::MissingField("id"));
        }

        Ok(event)
    }

    /// A user variable as a string, whether it was sent as a string or a number.
    #[must_use]
    pub fn user_variable(&self, name: &str) -> Option<String> {
        match self.user_variables.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The submission this event belongs to, from the `s` user variable.
    #[must_use]
    pub fn submission_id(&self) -> Option<SubmissionId> {
        self.user_variable(SUBMISSION_VARIABLE)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|id| *id > 0)
            .map(SubmissionId::new)
    }

    /// A header of the message this event refers to.
    #[must_use]
    pub fn message_header(&self, header: &str) -> Option<&str> {
        self.message.as_ref()?.headers.get(header)?.as_str()
    }

    /// The provider message id, taken from the embedded message headers.
    #[must_use]
    pub fn message_id(&self) -> String {
        self.message_header("message-id")
            .unwrap_or_default()
            .to_string()
    }

    /// UTC calendar date of the event.
    #[must_use]
    pub fn utc_date(&self) -> NaiveDate {
        utc_date(self.timestamp)
    }
}

/// Convert fractional epoch seconds into a UTC timestamp.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Timestamps are bounded well within i64 seconds and sub-second nanos"
)]
pub fn utc_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }

    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract().abs() * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// UTC calendar date for fractional epoch seconds.
///
/// Out of range timestamps fall back to the epoch date.
#[must_use]
pub fn utc_date(timestamp: f64) -> NaiveDate {
    utc_datetime(timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .date_naive()
}

fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.to_string().parse().ok(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("permanent") => Some(Severity::Permanent),
        Some("temporary") => Some(Severity::Temporary),
        _ => None,
    })
}
