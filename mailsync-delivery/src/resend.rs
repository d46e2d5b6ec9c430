//! Resending the original MIME of a failed event

use std::sync::Arc;

use mailsync_common::outgoing;
use mailsync_store::{EventRecord, EventStore, MimeCache, MimeFileName};

use crate::{
    DeliveryReconciler, MailgunApi, ResubmitError, SendOptions, SyncError,
    policy::MimeCachePolicy, provider::clean_message_id,
};

/// Tag applied to every resent message.
pub const RESUBMIT_TAG: &str = "resubmit";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResendOptions {
    /// Resend even if the provider reports the message as delivered
    pub allow_redeliver: bool,
    /// Do not fetch the message from provider storage
    pub use_local_cache_only: bool,
}

/// The single address of a recipient, if there is exactly one.
fn single_recipient(recipient: &str) -> Option<String> {
    let addresses = mailparse::addrparse(recipient).ok()?;
    match addresses.as_slice() {
        [mailparse::MailAddr::Single(info)] => Some(info.addr.clone()),
        _ => None,
    }
}

/// Sends the original message of an event again, to that event's recipient only.
#[derive(Debug, Clone)]
pub struct MessageResender {
    api: Arc<dyn MailgunApi>,
    reconciler: DeliveryReconciler,
    store: Arc<dyn EventStore>,
    mime_cache: Arc<dyn MimeCache>,
    cache_policy: MimeCachePolicy,
    domain: String,
}

impl MessageResender {
    #[must_use]
    pub fn new(
        api: Arc<dyn MailgunApi>,
        reconciler: DeliveryReconciler,
        store: Arc<dyn EventStore>,
        mime_cache: Arc<dyn MimeCache>,
        cache_policy: MimeCachePolicy,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            api,
            reconciler,
            store,
            mime_cache,
            cache_policy,
            domain: domain.into(),
        }
    }

    /// Resend the message behind `record` and return the new message id.
    ///
    /// Content comes from provider storage when available, otherwise from the
    /// local MIME cache. The resend is always a real send, whatever the
    /// global test mode.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn resend(
        &self,
        record: &mut EventRecord,
        options: ResendOptions,
    ) -> Result<String, SyncError> {
        let recipient =
            single_recipient(&record.recipient).ok_or(ResubmitError::MissingRecipient)?;

        if !options.allow_redeliver && self.reconciler.is_delivered(record).await? {
            return Err(ResubmitError::AlreadyDelivered.into());
        }

        let content = match self.remote_content(record, options).await {
            Some(content) => content,
            None => self
                .cached_content(record)
                .await
                .ok_or(ResubmitError::NoContentAvailable)?,
        };

        match self
            .store
            .count_failures(record.submission_id, &record.recipient)
            .await
        {
            Ok(failures) => self.cache_content(record, &content, failures).await,
            Err(err) => {
                tracing::warn!(event_id = %record.event_id, error = %err, "Failed to count failures, not caching MIME");
            }
        }

        outgoing!(
            level = INFO,
            "Resending message {} to {recipient}",
            record.message_id
        );

        let options = SendOptions {
            tags: vec![RESUBMIT_TAG.to_string()],
            test_mode: Some(false),
            ..Default::default()
        };
        let response = self
            .api
            .send_mime(&self.domain, &[recipient], &content, &options)
            .await?;

        response
            .id
            .as_deref()
            .map(clean_message_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResubmitError::ResendFailed.into())
    }

    async fn remote_content(&self, record: &EventRecord, options: ResendOptions) -> Option<Vec<u8>> {
        if options.use_local_cache_only {
            return None;
        }

        let Some(url) = record.storage_url.as_deref() else {
            tracing::info!(event_id = %record.event_id, "No storage URL, using local cache");
            return None;
        };

        outgoing!(level = DEBUG, "Fetching stored MIME from {url}");
        match self.api.show_mime(url).await {
            Ok(content) if !content.is_empty() => Some(content),
            Ok(_) => {
                tracing::info!(event_id = %record.event_id, "Stored MIME was empty, using local cache");
                None
            }
            Err(err) => {
                tracing::info!(event_id = %record.event_id, error = %err, "Could not fetch stored MIME, using local cache");
                None
            }
        }
    }

    /// A cached file linked from another event of the same message.
    ///
    /// Siblings share the submission, recipient and message id. Unlinked
    /// records have no siblings.
    async fn sibling_mime_file(&self, record: &EventRecord) -> Option<MimeFileName> {
        if record.submission_id.is_none() || record.message_id.is_empty() {
            return None;
        }

        match self
            .store
            .for_recipient(record.submission_id, &record.recipient)
            .await
        {
            Ok(records) => records
                .into_iter()
                .filter(|other| other.id != record.id && other.message_id == record.message_id)
                .find_map(|other| other.mime_file),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to look up related records");
                None
            }
        }
    }

    async fn read_cached(&self, name: &MimeFileName) -> Option<Vec<u8>> {
        match self.mime_cache.read(name).await {
            Ok(content) => content.filter(|content| !content.is_empty()),
            Err(err) => {
                tracing::warn!(mime_file = %name, error = %err, "Failed to read cached MIME");
                None
            }
        }
    }

    async fn cached_content(&self, record: &EventRecord) -> Option<Vec<u8>> {
        if let Some(name) = &record.mime_file
            && let Some(content) = self.read_cached(name).await
        {
            return Some(content);
        }

        let name = self.sibling_mime_file(record).await?;
        self.read_cached(&name).await
    }

    /// Keep a local copy of `content` when the cache policy asks for one.
    ///
    /// Failures are logged and otherwise ignored.
    async fn cache_content(&self, record: &mut EventRecord, content: &[u8], failures: usize) {
        let already_cached = match &record.mime_file {
            Some(name) => self.mime_cache.exists(name).await.unwrap_or(false),
            None => false,
        };

        if !self.cache_policy.should_cache(failures, already_cached) {
            return;
        }

        let name = match self.sibling_mime_file(record).await {
            Some(name) if self.mime_cache.exists(&name).await.unwrap_or(false) => name,
            _ => match self.mime_cache.write(content).await {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(event_id = %record.event_id, error = %err, "Failed to cache MIME");
                    return;
                }
            },
        };

        record.mime_file = Some(name);
        if let Err(err) = self.store.save(record).await {
            tracing::warn!(event_id = %record.event_id, error = %err, "Failed to link cached MIME");
        }
    }
}
