//! Backend storage implementations
//!
//! - `memory`: in-memory storage for tests and development
//! - `file`: file-based storage for production use

pub mod file;
pub mod memory;

pub use file::{FileEventStore, FileMimeCache, validate_path};
pub use memory::{MemoryEventStore, MemoryMimeCache};
