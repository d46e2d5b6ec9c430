//! Event ingestion, delivery reconciliation and resubmission
//!
//! This crate provides functionality to:
//! - Store provider events as idempotent records
//! - Check whether a failed message was delivered after all
//! - Resend failed messages within a per-recipient failure limit
//! - Send new messages directly or through a deferred job queue

mod error;
mod ingest;
mod params;
mod poll;
pub mod policy;
mod provider;
pub mod queue;
mod reconcile;
mod resend;
mod send;
mod service;

// Re-export error types
pub use error::{ManualResubmitError, ResubmitError, SyncError};
// Re-export provider types
pub use params::{Attachment, SendOptions, SendParameters, Template};
pub use provider::{EventQuery, MailgunApi, ProviderError, SendResponse, clean_message_id};
// Re-export queue types
pub use queue::{
    DeferredSendQueue, JobHandle, JobScheduler, MemoryScheduler, ScheduleError, SendJob,
    SendMode,
};
// Re-export core types
pub use ingest::EventIngestor;
pub use poll::EventPoller;
pub use policy::{MimeCachePolicy, ResubmitPolicy, ResubmitState};
pub use reconcile::DeliveryReconciler;
pub use resend::{MessageResender, RESUBMIT_TAG, ResendOptions};
pub use send::{MessageSender, SendConfig, SendOutcome};
pub use service::ResubmissionService;
