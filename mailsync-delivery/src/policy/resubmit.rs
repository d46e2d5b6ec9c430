//! Whether a failed event may be resent automatically.

use mailsync_store::EventRecord;
use serde::{Deserialize, Serialize};

/// Where an event stands with respect to automated resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitState {
    /// Not a failed or rejected event
    NotApplicable,
    /// This event has already been resent
    Resubmitted,
    /// The provider delivered the message after this failure
    BlockedDelivered,
    /// Too many failures for the submission and recipient
    BlockedLimit,
    Eligible,
}

/// Resubmission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmitPolicy {
    /// Failed or rejected events allowed per submission and recipient before
    /// automated resubmission stops.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_failures")]
    pub max_failures: usize,
}

impl Default for ResubmitPolicy {
    fn default() -> Self {
        Self {
            max_failures: defaults::max_failures(),
        }
    }
}

impl ResubmitPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while `failures` is below the limit.
    #[must_use]
    pub const fn can_resubmit(&self, failures: usize) -> bool {
        failures < self.max_failures
    }

    /// Classify `record`, given the failure count for its recipient.
    ///
    /// Rules are checked in order and the first match wins.
    #[must_use]
    pub const fn evaluate(&self, record: &EventRecord, failures: usize) -> ResubmitState {
        if !record.is_failure_or_rejected() {
            ResubmitState::NotApplicable
        } else if record.resubmitted {
            ResubmitState::Resubmitted
        } else if record.failed_then_delivered {
            ResubmitState::BlockedDelivered
        } else if !self.can_resubmit(failures) {
            ResubmitState::BlockedLimit
        } else {
            ResubmitState::Eligible
        }
    }
}

mod defaults {
    pub const fn max_failures() -> usize {
        3
    }
}
