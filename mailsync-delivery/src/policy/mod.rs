//! Policy decisions for resubmission.
//!
//! - [`ResubmitPolicy`]: whether a failed event may be resent automatically
//! - [`MimeCachePolicy`]: whether the original message is kept locally

pub mod cache;
pub mod resubmit;

pub use cache::MimeCachePolicy;
pub use resubmit::{ResubmitPolicy, ResubmitState};
