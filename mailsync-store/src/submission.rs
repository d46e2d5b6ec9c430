use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsync_common::SubmissionId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A locally initiated send that provider events can be linked back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub created: DateTime<Utc>,
}

impl Submission {
    /// Seconds since the submission was created
    #[must_use]
    pub fn message_age(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created).num_seconds()
    }
}

/// Lookup of submissions by id.
#[async_trait]
pub trait SubmissionStore: Send + Sync + std::fmt::Debug {
    async fn find(&self, id: SubmissionId) -> Result<Option<Submission>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySubmissionStore {
    submissions: Arc<RwLock<HashMap<SubmissionId, Submission>>>,
}

impl MemorySubmissionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, submission: Submission) -> Result<()> {
        self.submissions
            .write()?
            .insert(submission.id, submission);
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn find(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.submissions.read()?.get(&id).cloned())
    }
}
