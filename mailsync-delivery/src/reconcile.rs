//! Checking the provider for deliveries that followed a failure

use std::sync::Arc;

use chrono::{Duration, Utc};
use mailsync_common::{EventType, internal, outgoing};
use mailsync_store::{EventRecord, MimeCache, MimeFileName};

use crate::{EventIngestor, EventQuery, MailgunApi, SyncError};

/// How far back the provider keeps events.
const LOOKBACK_DAYS: i64 = 30;

/// Maximum number of delivered events fetched per check.
const DELIVERED_LIMIT: usize = 25;

/// Reconciles local failure records with the provider's delivery state.
///
/// The provider may report a failure and later deliver the same message, so
/// a failed record is not proof that the recipient never got it.
#[derive(Debug, Clone)]
pub struct DeliveryReconciler {
    api: Arc<dyn MailgunApi>,
    ingestor: EventIngestor,
    mime_cache: Arc<dyn MimeCache>,
}

impl DeliveryReconciler {
    #[must_use]
    pub fn new(
        api: Arc<dyn MailgunApi>,
        ingestor: EventIngestor,
        mime_cache: Arc<dyn MimeCache>,
    ) -> Self {
        Self {
            api,
            ingestor,
            mime_cache,
        }
    }

    /// Whether the provider has delivered the record's message to its recipient.
    ///
    /// Any delivered events found are stored as records of their own.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn is_delivered(&self, record: &EventRecord) -> Result<bool, SyncError> {
        if record.message_id.is_empty() {
            return Err(SyncError::MissingCorrelation(format!(
                "event {} has no message id",
                record.event_id
            )));
        }

        let query = EventQuery {
            begin: Some(Utc::now() - Duration::days(LOOKBACK_DAYS)),
            event: Some(EventType::Delivered),
            limit: Some(DELIVERED_LIMIT),
            message_id: Some(record.message_id.clone()),
            recipient: Some(record.recipient.clone()),
        };

        outgoing!(
            level = DEBUG,
            "Querying delivered events for {} to {}",
            record.message_id,
            record.recipient
        );
        let events = self.api.events(&query).await?;

        for event in &events {
            self.ingestor.ingest(event).await?;
        }

        Ok(!events.is_empty())
    }

    /// Mark a failed record as delivered after all.
    ///
    /// The record's link to its cached MIME copy is dropped, and the file is
    /// removed unless another record still links it. Cleanup failures are
    /// only logged.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn confirm_delivery(&self, record: &mut EventRecord) -> Result<(), SyncError> {
        record.failed_then_delivered = true;
        self.ingestor.store().save(record).await?;

        if let Some(name) = record.mime_file.clone() {
            if self.shared_with_other_records(record, &name).await {
                internal!(level = DEBUG, "Keeping {name}, still linked from other records");
            } else if let Err(err) = self.mime_cache.remove(&name).await {
                tracing::warn!(mime_file = %name, error = %err, "Failed to remove cached MIME");
            }

            record.mime_file = None;
            if let Err(err) = self.ingestor.store().save(record).await {
                tracing::warn!(error = %err, "Failed to unlink cached MIME file");
            }
        }

        tracing::info!(
            recipient = %record.recipient,
            message_id = %record.message_id,
            "Failed event was delivered after all"
        );

        Ok(())
    }

    /// Whether another record links `name`. Lookup failures count as shared.
    async fn shared_with_other_records(&self, record: &EventRecord, name: &MimeFileName) -> bool {
        match self
            .ingestor
            .store()
            .for_recipient(record.submission_id, &record.recipient)
            .await
        {
            Ok(records) => records
                .iter()
                .any(|other| other.id != record.id && other.mime_file.as_ref() == Some(name)),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to look up records sharing cached MIME");
                true
            }
        }
    }
}
