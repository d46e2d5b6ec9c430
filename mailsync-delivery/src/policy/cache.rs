//! When to keep a local copy of a failed message.

use mailsync_store::MimeCacheConfig;

/// Decides whether original MIME content is cached.
///
/// Provider storage expires after a few days, so messages that keep failing
/// are copied locally to stay resendable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeCachePolicy {
    enabled: bool,
    failure_threshold: usize,
    force: bool,
}

impl From<&MimeCacheConfig> for MimeCachePolicy {
    fn from(config: &MimeCacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold,
            force: config.force,
        }
    }
}

impl MimeCachePolicy {
    #[must_use]
    pub const fn should_cache(&self, failures: usize, already_cached: bool) -> bool {
        self.enabled && !already_cached && (self.force || failures >= self.failure_threshold)
    }
}
