//! The wired-up relay

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailsync_common::{RawEvent, incoming, internal, webhook::WEBHOOK_FILTER_VARIABLE};
use mailsync_delivery::{
    EventIngestor, EventPoller, EventQuery, JobHandle, JobScheduler, MailgunApi,
    ManualResubmitError, MemoryScheduler, MessageSender, ResubmissionService, SendOutcome,
    SendParameters, SendResponse, SyncError, queue::run_at,
};
use mailsync_store::{EventRecord, EventRecordId, EventStore};

/// Outcome of [`Relay::run_due_jobs`].
#[derive(Debug, Default)]
pub struct JobRun {
    pub sent: Vec<(JobHandle, SendResponse)>,
    /// Retryable failures, with their new schedule
    pub requeued: Vec<JobHandle>,
    pub failed: Vec<(JobHandle, SyncError)>,
}

/// Entry points for webhooks, operators and the job runner.
///
/// Built by [`crate::Mailsync::init`].
#[derive(Debug, Clone)]
pub struct Relay {
    pub(crate) api: Arc<dyn MailgunApi>,
    pub(crate) store: Arc<dyn EventStore>,
    pub(crate) ingestor: EventIngestor,
    pub(crate) service: ResubmissionService,
    pub(crate) sender: MessageSender,
    pub(crate) poller: EventPoller,
    pub(crate) filter_variable: Option<String>,
}

impl Relay {
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Store the event in a webhook body.
    ///
    /// Returns `Ok(None)` when the event carries another installation's
    /// filter variable and was ignored.
    #[tracing::instrument(level = "debug", skip_all, fields(len = body.len()))]
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<Option<EventRecord>, SyncError> {
        let event = RawEvent::parse(body)?;

        if let Some(expected) = &self.filter_variable {
            let received = event.user_variable(WEBHOOK_FILTER_VARIABLE);
            if received.as_deref() != Some(expected.as_str()) {
                incoming!(
                    level = DEBUG,
                    "Ignoring event {} with filter variable {received:?}",
                    event.id
                );
                return Ok(None);
            }
        }

        let record = self.ingestor.ingest(&event).await?;
        incoming!(
            level = INFO,
            "Received {} event for {}",
            record.event_type,
            record.recipient
        );

        Ok(Some(record))
    }

    pub async fn record(&self, id: &EventRecordId) -> Result<EventRecord, SyncError> {
        Ok(self.store.get(id).await?)
    }

    /// See [`ResubmissionService::automated_resubmit`].
    pub async fn automated_resubmit(&self, record: &mut EventRecord) -> Result<bool, SyncError> {
        self.service.automated_resubmit(record).await
    }

    /// See [`ResubmissionService::manual_resubmit`].
    pub async fn manual_resubmit(
        &self,
        record: &mut EventRecord,
    ) -> Result<String, ManualResubmitError> {
        self.service.manual_resubmit(record).await
    }

    /// See [`ResubmissionService::delivery_check`].
    pub async fn delivery_check(&self, record: &mut EventRecord) -> Result<bool, SyncError> {
        self.service.delivery_check(record).await
    }

    pub async fn send(&self, params: SendParameters) -> Result<SendOutcome, SyncError> {
        self.sender.send(params).await
    }

    pub async fn poll(
        &self,
        query: &EventQuery,
        resubmit: bool,
    ) -> Result<Vec<EventRecord>, SyncError> {
        self.poller.poll(query, resubmit).await
    }

    /// Run every job in `scheduler` that is due at `now`.
    ///
    /// Jobs that fail with a retryable error are scheduled again one minute
    /// after `now`. Other failures are returned and the job is dropped.
    #[tracing::instrument(level = "debug", skip(self, scheduler))]
    pub async fn run_due_jobs(
        &self,
        scheduler: &MemoryScheduler,
        now: DateTime<Utc>,
    ) -> Result<JobRun, SyncError> {
        let due = scheduler.take_due(now)?;
        internal!(level = DEBUG, "Running {} due send jobs", due.len());

        let mut run = JobRun::default();
        for (handle, job) in due {
            match job.execute(self.api.as_ref()).await {
                Ok(response) => run.sent.push((handle, response)),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(job_id = %handle.id, error = %err, "Deferred send failed, retrying");
                    match scheduler.schedule(job, run_at(now, "")).await {
                        Ok(retry) => run.requeued.push(retry),
                        Err(schedule_err) => run.failed.push((handle, schedule_err.into())),
                    }
                }
                Err(err) => {
                    tracing::error!(job_id = %handle.id, error = %err, "Deferred send failed");
                    run.failed.push((handle, err));
                }
            }
        }

        Ok(run)
    }
}
