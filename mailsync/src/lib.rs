//! Mailgun delivery tracking and automated resubmission
//!
//! [`Mailsync`] is read from RON and wires the event store, MIME cache and
//! provider API into a [`Relay`].

pub mod controller;
mod relay;

pub use controller::{Mailsync, find_config_file};
pub use relay::{JobRun, Relay};
