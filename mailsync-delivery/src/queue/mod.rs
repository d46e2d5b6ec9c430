//! Deferred sending through a job scheduler

pub mod attachments;
pub mod delay;
pub mod job;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::{
    attachments::EncodedAttachment,
    delay::{parse_delay, run_at},
    job::{JobHandle, JobScheduler, MemoryScheduler, ScheduleError, SendJob},
};
use crate::SendParameters;

/// Whether outgoing messages are sent directly or through the job queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMode {
    /// Every message is queued
    #[serde(rename = "yes")]
    Always,
    /// Only messages with attachments are queued
    #[serde(rename = "when-attachments")]
    WhenAttachments,
    /// Messages are sent immediately
    #[default]
    #[serde(rename = "no")]
    Never,
}

impl SendMode {
    #[must_use]
    pub fn should_queue(self, params: &SendParameters) -> bool {
        match self {
            Self::Always => true,
            Self::WhenAttachments => params.has_attachments(),
            Self::Never => false,
        }
    }
}

/// Queues sends to run after a delay.
#[derive(Debug, Clone)]
pub struct DeferredSendQueue {
    scheduler: Arc<dyn JobScheduler>,
}

impl DeferredSendQueue {
    #[must_use]
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }

    /// Queue a send to run `delay` from now.
    ///
    /// An empty or unparsable delay means one minute.
    pub async fn enqueue(
        &self,
        domain: &str,
        params: SendParameters,
        delay: &str,
    ) -> Result<JobHandle, ScheduleError> {
        self.enqueue_at(domain, params, delay, Utc::now()).await
    }

    #[tracing::instrument(level = "debug", skip(self, params))]
    pub async fn enqueue_at(
        &self,
        domain: &str,
        params: SendParameters,
        delay: &str,
        now: DateTime<Utc>,
    ) -> Result<JobHandle, ScheduleError> {
        let job = SendJob::new(domain, params);
        let handle = self.scheduler.schedule(job, run_at(now, delay)).await?;

        tracing::info!(job_id = %handle.id, run_at = %handle.run_at, "Queued deferred send");

        Ok(handle)
    }
}
