use async_trait::async_trait;
use chrono::NaiveDate;
use mailsync_common::{EventType, SubmissionId};

use crate::{EventKey, EventRecord, EventRecordId, Result};

/// Persistent storage of event records.
///
/// Saving is an upsert on [`EventKey`]: a record without an id whose key is
/// already stored takes over the existing id, so concurrent saves of the same
/// key converge on one record.
#[async_trait]
pub trait EventStore: Send + Sync + std::fmt::Debug {
    /// Insert or update a record, assigning its id if needed
    async fn save(&self, record: &mut EventRecord) -> Result<EventRecordId>;

    async fn find(&self, key: &EventKey) -> Result<Option<EventRecord>>;

    async fn get(&self, id: &EventRecordId) -> Result<EventRecord>;

    /// All record ids, oldest first
    async fn list(&self) -> Result<Vec<EventRecordId>>;

    /// All records for a submission and recipient pair
    async fn for_recipient(
        &self,
        submission_id: Option<SubmissionId>,
        recipient: &str,
    ) -> Result<Vec<EventRecord>>;

    /// Number of failed or rejected events for a submission and recipient pair
    async fn count_failures(
        &self,
        submission_id: Option<SubmissionId>,
        recipient: &str,
    ) -> Result<usize> {
        Ok(self
            .for_recipient(submission_id, recipient)
            .await?
            .iter()
            .filter(|record| record.is_failure_or_rejected())
            .count())
    }

    /// A record with this event id and date, whatever its submission
    async fn find_by_event(&self, event_id: &str, date: NaiveDate) -> Result<Option<EventRecord>> {
        for id in self.list().await? {
            let record = self.get(&id).await?;
            if record.event_id == event_id && record.date == date {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    async fn list_by_type(&self, event_type: EventType) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for id in self.list().await? {
            let record = self.get(&id).await?;
            if record.event_type == event_type {
                records.push(record);
            }
        }

        Ok(records)
    }
}
