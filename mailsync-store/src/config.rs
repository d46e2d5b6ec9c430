use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    EventStore, FileEventStore, FileMimeCache, MemoryEventStore, MemoryMimeCache, MimeCache,
};

/// Configuration for the event record store
///
/// # Examples
///
/// File-backed store in RON config:
/// ```ron
/// Mailsync (
///     store: File(
///         path: "/var/lib/mailsync/events",
///     ),
/// )
/// ```
///
/// Memory-backed store with capacity limit:
/// ```ron
/// Mailsync (
///     store: Memory(
///         capacity: Some(1000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// Memory-based store (testing/development)
    Memory {
        /// Maximum number of records to store (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
    /// File-based store (production)
    File { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory { capacity: None }
    }
}

impl StoreConfig {
    /// Build the configured event store
    ///
    /// # Errors
    /// Returns an error if the store directory is invalid or cannot be created
    pub async fn into_event_store(self) -> crate::Result<Arc<dyn EventStore>> {
        Ok(match self {
            Self::Memory {
                capacity: Some(capacity),
            } => Arc::new(MemoryEventStore::with_capacity(capacity)),
            Self::Memory { capacity: None } => Arc::new(MemoryEventStore::new()),
            Self::File { path } => Arc::new(FileEventStore::open(path).await?),
        })
    }
}

const fn default_failure_threshold() -> usize {
    2
}

/// When and where original MIME messages are cached
///
/// ```ron
/// Mailsync (
///     mime_cache: (
///         enabled: true,
///         path: Some("/var/lib/mailsync/mime"),
///         failure_threshold: 2,
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MimeCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Cache directory; blobs are kept in memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Number of failures for a recipient before the message is cached
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    /// Cache on every failure regardless of the threshold
    #[serde(default)]
    pub force: bool,
}

impl Default for MimeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            failure_threshold: default_failure_threshold(),
            force: false,
        }
    }
}

impl MimeCacheConfig {
    /// Build the configured MIME cache
    ///
    /// # Errors
    /// Returns an error if the cache directory is invalid or cannot be created
    pub async fn mime_cache(&self) -> crate::Result<Arc<dyn MimeCache>> {
        Ok(match &self.path {
            Some(path) => Arc::new(FileMimeCache::open(path.clone()).await?),
            None => Arc::new(MemoryMimeCache::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_store_config_from_ron() {
        let file: StoreConfig = ron::from_str(r#"File(path: "/var/lib/mailsync")"#).unwrap();
        assert_eq!(
            file,
            StoreConfig::File {
                path: PathBuf::from("/var/lib/mailsync")
            }
        );

        let memory: StoreConfig = ron::from_str("Memory(capacity: Some(10))").unwrap();
        assert_eq!(memory, StoreConfig::Memory { capacity: Some(10) });
    }

    #[test]
    fn test_mime_cache_defaults() {
        let config: MimeCacheConfig = ron::from_str("(enabled: true)").unwrap();
        assert_eq!(
            config,
            MimeCacheConfig {
                enabled: true,
                ..Default::default()
            }
        );
        assert_eq!(config.failure_threshold, 2);
    }

    #[tokio::test]
    async fn test_file_store_rejects_system_directory() {
        let config = StoreConfig::File {
            path: PathBuf::from("/etc/mailsync"),
        };
        assert!(config.into_event_store().await.is_err());
    }
}
