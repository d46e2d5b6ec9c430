//! Entry points for resubmitting failed events

use std::sync::Arc;

use mailsync_store::{EventRecord, EventStore};

use crate::{
    DeliveryReconciler, ManualResubmitError, MessageResender, ResendOptions, ResubmitError,
    SyncError,
    policy::{ResubmitPolicy, ResubmitState},
};

/// Resubmits failed events, automatically or on an operator's request.
#[derive(Debug, Clone)]
pub struct ResubmissionService {
    store: Arc<dyn EventStore>,
    reconciler: DeliveryReconciler,
    resender: MessageResender,
    policy: ResubmitPolicy,
}

impl ResubmissionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        reconciler: DeliveryReconciler,
        resender: MessageResender,
        policy: ResubmitPolicy,
    ) -> Self {
        Self {
            store,
            reconciler,
            resender,
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &ResubmitPolicy {
        &self.policy
    }

    /// Failed or rejected events for the record's submission and recipient.
    pub async fn recipient_failures(&self, record: &EventRecord) -> Result<usize, SyncError> {
        let failures = self
            .store
            .count_failures(record.submission_id, &record.recipient)
            .await?;

        tracing::debug!(
            submission_id = ?record.submission_id,
            recipient = %record.recipient,
            failures,
            "Counted recipient failures"
        );

        Ok(failures)
    }

    /// Resend a failed event if policy allows.
    ///
    /// Returns `Ok(false)` when there is nothing to do (not a failure, already
    /// resent, or delivered after all) and `Ok(true)` once resent. Reaching
    /// the failure limit is an error. A single event is resent at most once.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn automated_resubmit(&self, record: &mut EventRecord) -> Result<bool, SyncError> {
        let failures = self.recipient_failures(record).await?;

        match self.policy.evaluate(record, failures) {
            ResubmitState::NotApplicable
            | ResubmitState::Resubmitted
            | ResubmitState::BlockedDelivered => Ok(false),
            ResubmitState::BlockedLimit => {
                tracing::info!(
                    recipient = %record.recipient,
                    failures,
                    max = self.policy.max_failures,
                    "Too many failures, not resubmitting"
                );
                Err(ResubmitError::LimitExceeded {
                    failures,
                    max: self.policy.max_failures,
                }
                .into())
            }
            ResubmitState::Eligible => {
                match self.resender.resend(record, ResendOptions::default()).await {
                    Ok(message_id) => {
                        record.resubmitted = true;
                        self.store.save(record).await?;

                        tracing::info!(
                            event_id = %record.event_id,
                            message_id = %message_id,
                            "Resubmitted failed event"
                        );
                        Ok(true)
                    }
                    Err(SyncError::Resubmit(ResubmitError::AlreadyDelivered)) => {
                        self.reconciler.confirm_delivery(record).await?;
                        Err(ResubmitError::AlreadyDelivered.into())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Resend an event on an operator's request.
    ///
    /// Failed, rejected and delivered events may be resent; a delivered one is
    /// resent even though the provider reports it delivered. The record's
    /// `resubmitted` flag is not changed.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn manual_resubmit(
        &self,
        record: &mut EventRecord,
    ) -> Result<String, ManualResubmitError> {
        if !record.is_failure_or_rejected() && !record.is_delivered() {
            return Err(ManualResubmitError::Validation(
                "Can only resubmit an event if it is failed/rejected/delivered".to_string(),
            ));
        }

        let options = ResendOptions {
            allow_redeliver: record.is_delivered(),
            ..Default::default()
        };

        match self.resender.resend(record, options).await {
            Ok(message_id) => Ok(message_id),
            Err(SyncError::Resubmit(ResubmitError::ResendFailed)) => {
                Err(ManualResubmitError::Validation(
                    "Sorry, could not resubmit this event. More information may be available in system logs."
                        .to_string(),
                ))
            }
            Err(err) => {
                tracing::warn!(event_id = %record.event_id, error = %err, "Manual resubmit failed");
                Err(ManualResubmitError::Validation(err.to_string()))
            }
        }
    }

    /// Check whether a failed event was delivered after all, and mark it if so.
    ///
    /// Returns `true` when the record was found delivered.
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    pub async fn delivery_check(&self, record: &mut EventRecord) -> Result<bool, SyncError> {
        if !record.is_failure_or_rejected() || record.failed_then_delivered {
            return Ok(false);
        }

        if self.reconciler.is_delivered(record).await? {
            self.reconciler.confirm_delivery(record).await?;
            return Ok(true);
        }

        Ok(false)
    }
}
