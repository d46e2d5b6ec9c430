//! Deferred send jobs and the schedulers that run them
//!
//! A [`SendJob`] is stored as JSON until it is due. [`MemoryScheduler`] keeps
//! jobs in process and hands each one out once.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsync_common::internal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    MailgunApi, SendParameters, SendResponse, SyncError,
    queue::attachments::{EncodedAttachment, decode_attachments, encode_attachments},
};

/// Errors raised while scheduling or loading deferred jobs.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Failed to serialize job: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The job payload could not be turned back into send parameters.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Scheduler rejected job: {0}")]
    Rejected(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for ScheduleError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

/// A send to perform later.
///
/// Attachment content is carried base64-encoded so the job can be stored as
/// text by any scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendJob {
    pub domain: String,
    pub params: SendParameters,
    #[serde(default)]
    pub attachments: Vec<EncodedAttachment>,
}

impl SendJob {
    #[must_use]
    pub fn new(domain: impl Into<String>, mut params: SendParameters) -> Self {
        let attachments = encode_attachments(&params.attachments);
        params.attachments.clear();

        Self {
            domain: domain.into(),
            params,
            attachments,
        }
    }

    /// The send parameters with attachment content decoded.
    pub fn parameters(&self) -> Result<SendParameters, ScheduleError> {
        let mut params = self.params.clone();
        params.attachments = decode_attachments(&self.attachments)
            .map_err(|e| ScheduleError::InvalidJob(format!("attachment content: {e}")))?;

        Ok(params)
    }

    /// Perform the send.
    #[tracing::instrument(level = "debug", skip_all, fields(domain = %self.domain))]
    pub async fn execute(&self, api: &dyn MailgunApi) -> Result<SendResponse, SyncError> {
        let params = self.parameters()?;
        Ok(api.send(&self.domain, &params).await?)
    }
}

/// A job accepted by a [`JobScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: ulid::Ulid,
    pub run_at: DateTime<Utc>,
}

/// Something that runs a [`SendJob`] once, at or after a given time.
#[async_trait]
pub trait JobScheduler: Send + Sync + std::fmt::Debug {
    async fn schedule(
        &self,
        job: SendJob,
        run_at: DateTime<Utc>,
    ) -> Result<JobHandle, ScheduleError>;
}

/// In-process scheduler for development and tests.
///
/// Jobs are held serialized, exactly as a persistent scheduler would store
/// them, and [`MemoryScheduler::take_due`] hands each one out only once.
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    jobs: Arc<Mutex<Vec<(JobHandle, String)>>>,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs not yet handed out.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Remove and return every job due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<(JobHandle, SendJob)>, ScheduleError> {
        let mut due = {
            let mut jobs = self.jobs.lock()?;
            let (due, waiting): (Vec<_>, Vec<_>) =
                jobs.drain(..).partition(|(handle, _)| handle.run_at <= now);
            *jobs = waiting;
            due
        };
        due.sort_by_key(|(handle, _)| (handle.run_at, handle.id));

        due.into_iter()
            .map(|(handle, payload)| -> Result<_, ScheduleError> {
                Ok((handle, serde_json::from_str::<SendJob>(&payload)?))
            })
            .collect()
    }
}

#[async_trait]
impl JobScheduler for MemoryScheduler {
    async fn schedule(
        &self,
        job: SendJob,
        run_at: DateTime<Utc>,
    ) -> Result<JobHandle, ScheduleError> {
        let payload = serde_json::to_string(&job)?;
        let handle = JobHandle {
            id: ulid::Ulid::new(),
            run_at,
        };

        self.jobs.lock()?.push((handle, payload));
        internal!(level = DEBUG, "Scheduled send job {} for {run_at}", handle.id);

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::Attachment;

    fn job_with_attachment() -> SendJob {
        SendJob::new(
            "mg.example.com",
            SendParameters {
                to: vec!["alice@example.com".to_string()],
                subject: "Report".to_string(),
                attachments: vec![Attachment {
                    filename: "data.bin".to_string(),
                    content_type: None,
                    content: vec![0, 159, 146, 150, 255, 10, 13],
                }],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_attachments_survive_serialization() {
        let job = job_with_attachment();
        assert!(job.params.attachments.is_empty());

        let json = serde_json::to_string(&job).unwrap();
        let restored: SendJob = serde_json::from_str(&json).unwrap();
        let params = restored.parameters().unwrap();

        assert_eq!(params.attachments[0].content, vec![0, 159, 146, 150, 255, 10, 13]);
        assert_eq!(params.subject, "Report");
    }

    #[tokio::test]
    async fn test_memory_scheduler_hands_out_due_jobs_once() {
        let scheduler = MemoryScheduler::new();
        let now = Utc::now();

        scheduler
            .schedule(job_with_attachment(), now + Duration::minutes(1))
            .await
            .unwrap();
        scheduler
            .schedule(job_with_attachment(), now + Duration::hours(1))
            .await
            .unwrap();

        assert!(scheduler.take_due(now).unwrap().is_empty());

        let due = scheduler.take_due(now + Duration::minutes(2)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.domain, "mg.example.com");

        assert!(scheduler.take_due(now + Duration::minutes(2)).unwrap().is_empty());
        assert_eq!(scheduler.pending(), 1);
    }
}
