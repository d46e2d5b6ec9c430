//! Durable storage for provider events
//!
//! Event records are keyed by submission, provider event id and UTC date, and
//! saving the same key twice converges on a single record. Cached MIME
//! content for failed messages lives alongside in a [`MimeCache`].

pub mod backends;
pub mod config;
pub mod error;
pub mod mime;
pub mod record;
pub mod store;
pub mod submission;

pub use backends::{FileEventStore, FileMimeCache, MemoryEventStore, MemoryMimeCache};
pub use config::{MimeCacheConfig, StoreConfig};
pub use error::{Result, SerializationError, StoreError, ValidationError};
pub use mime::{MimeCache, MimeFileName};
pub use record::{EventKey, EventRecord, EventRecordId};
pub use store::EventStore;
pub use submission::{MemorySubmissionStore, Submission, SubmissionStore};
