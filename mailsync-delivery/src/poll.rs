//! Pulling events from the provider instead of waiting for webhooks

use std::sync::Arc;

use mailsync_common::incoming;
use mailsync_store::EventRecord;

use crate::{EventIngestor, EventQuery, MailgunApi, ResubmissionService, SyncError};

#[derive(Debug, Clone)]
pub struct EventPoller {
    api: Arc<dyn MailgunApi>,
    ingestor: EventIngestor,
    service: ResubmissionService,
}

impl EventPoller {
    #[must_use]
    pub fn new(
        api: Arc<dyn MailgunApi>,
        ingestor: EventIngestor,
        service: ResubmissionService,
    ) -> Self {
        Self {
            api,
            ingestor,
            service,
        }
    }

    /// Fetch and store the events matching `query`.
    ///
    /// With `resubmit` set, failed and rejected events are also run through
    /// automated resubmission. A resubmission failure is logged and does not
    /// stop the poll.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn poll(&self, query: &EventQuery, resubmit: bool) -> Result<Vec<EventRecord>, SyncError> {
        let events = self.api.events(query).await?;
        incoming!(level = DEBUG, "Polled {} events", events.len());

        let mut records = Vec::with_capacity(events.len());
        for event in &events {
            let mut record = self.ingestor.ingest(event).await?;

            if resubmit
                && record.is_failure_or_rejected()
                && let Err(err) = self.service.automated_resubmit(&mut record).await
            {
                tracing::warn!(event_id = %record.event_id, error = %err, "Automated resubmit failed");
            }

            records.push(record);
        }

        Ok(records)
    }
}
