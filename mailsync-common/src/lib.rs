//! Types shared across the mailsync crates
//!
//! This crate holds the provider event vocabulary, webhook payload parsing and
//! the logging setup used by every other crate in the workspace.

pub mod error;
pub mod event;
pub mod logging;
pub mod webhook;

pub use error::PayloadError;
pub use event::{DeliveryStatusDetail, EventType, Severity, SubmissionId};
pub use tracing;
pub use webhook::{RawEvent, WebhookEnvelope};
