//! Turning provider events into stored records

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use mailsync_common::{DeliveryStatusDetail, RawEvent, SubmissionId, incoming};
use mailsync_store::{EventKey, EventRecord, EventStore, SubmissionStore};

use crate::SyncError;

/// Stores provider events as [`EventRecord`]s.
///
/// Ingestion is an idempotent upsert: an event already stored under the same
/// submission, event id and UTC date is updated in place. Resubmission state
/// on an existing record is left untouched.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    store: Arc<dyn EventStore>,
    submissions: Arc<dyn SubmissionStore>,
}

impl EventIngestor {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, submissions: Arc<dyn SubmissionStore>) -> Self {
        Self { store, submissions }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The local submission an event belongs to, if it can be found.
    async fn resolve_submission(&self, event: &RawEvent) -> Result<Option<SubmissionId>, SyncError> {
        let Some(id) = event.submission_id() else {
            return Ok(None);
        };

        let submission = self.submissions.find(id).await?;
        if submission.is_none() {
            tracing::debug!(submission_id = %id, event_id = %event.id, "Submission not found, storing event unlinked");
        }

        Ok(submission.map(|submission| submission.id))
    }

    /// Create or update the record for `event`.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %event.id, event = %event.event))]
    pub async fn ingest(&self, event: &RawEvent) -> Result<EventRecord, SyncError> {
        let submission_id = self.resolve_submission(event).await?;
        let key = EventKey {
            submission_id,
            event_id: event.id.clone(),
            date: event.utc_date(),
        };

        let existing = match self.store.find(&key).await? {
            Some(record) => Some(record),
            // The submission is gone; match on event id and date alone
            None if submission_id.is_none() && event.submission_id().is_some() => {
                self.store.find_by_event(&event.id, key.date).await?
            }
            None => None,
        };

        let mut record = existing.unwrap_or_default();
        let submission_id = submission_id.or(record.submission_id);
        populate(&mut record, event, submission_id);
        self.store.save(&mut record).await?;

        incoming!(
            level = DEBUG,
            "Stored {} event {} for {}",
            record.event_type,
            record.event_id,
            record.recipient
        );

        Ok(record)
    }

    /// Ingest `event`, logging instead of returning a failure.
    pub async fn store_event(&self, event: &RawEvent) -> Option<EventRecord> {
        match self.ingest(event).await {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::error!(event_id = %event.id, error = %err, "Failed to store event");
                None
            }
        }
    }
}

/// The provider's storage key, decoded when it is valid base64 text.
fn decode_storage_key(key: &str) -> String {
    STANDARD
        .decode(key)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| key.to_string())
}

fn populate(record: &mut EventRecord, event: &RawEvent, submission_id: Option<SubmissionId>) {
    record.event_id.clone_from(&event.id);
    record.date = event.utc_date();
    record.submission_id = submission_id;
    record.event_type = event.event;
    record.severity = event.severity;
    record.recipient.clone_from(&event.recipient);
    record.reason.clone_from(&event.reason);
    record.message_id = event.message_id();
    record.tags.clone_from(&event.tags);
    record.timestamp = event.timestamp;

    if let Some(status) = &event.delivery_status {
        record.delivery_status = DeliveryStatusDetail {
            message: status.message.clone().unwrap_or_default(),
            description: status.description.clone().unwrap_or_default(),
            code: status.code,
            attempts: status.attempt_no,
            session_seconds: status.session_seconds,
            mx_host: status.mx_host.clone().unwrap_or_default(),
        };
    }

    if let Some(storage) = &event.storage {
        record.storage_url = storage.url.clone().filter(|url| !url.is_empty());
        record.storage_key = storage
            .key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(decode_storage_key);
    }
}
