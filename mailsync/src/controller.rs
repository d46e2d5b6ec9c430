use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use mailsync_common::{internal, logging};
use mailsync_delivery::{
    DeferredSendQueue, DeliveryReconciler, EventIngestor, EventPoller, MailgunApi,
    MessageResender, MessageSender, MimeCachePolicy, ResubmitPolicy, ResubmissionService,
    SendConfig,
};
use mailsync_store::{MimeCacheConfig, StoreConfig, SubmissionStore};
use serde::Deserialize;

use crate::Relay;

pub const CONFIG_ENV: &str = "MAILSYNC_CONFIG";

/// Top-level configuration
///
/// ```ron
/// Mailsync (
///     store: File(path: "/var/lib/mailsync/events"),
///     mime_cache: (enabled: true, path: Some("/var/lib/mailsync/mime")),
///     resubmit: (max_failures: 3),
///     send: (api_domain: "mg.example.com"),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Mailsync {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mime_cache: MimeCacheConfig,
    #[serde(default)]
    pub resubmit: ResubmitPolicy,
    #[serde(default)]
    pub send: SendConfig,
}

impl Mailsync {
    /// Read and parse a RON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Build a [`Relay`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the event store or MIME cache cannot be opened.
    #[tracing::instrument(level = "debug", skip_all, fields(domain = %self.send.api_domain))]
    pub async fn init(
        self,
        api: Arc<dyn MailgunApi>,
        scheduler: Arc<dyn mailsync_delivery::JobScheduler>,
        submissions: Arc<dyn SubmissionStore>,
    ) -> anyhow::Result<Relay> {
        logging::init();

        let store = self
            .store
            .into_event_store()
            .await
            .context("Failed to open event store")?;
        let mime_cache = self
            .mime_cache
            .mime_cache()
            .await
            .context("Failed to open MIME cache")?;

        let ingestor = EventIngestor::new(store.clone(), submissions);
        let reconciler = DeliveryReconciler::new(api.clone(), ingestor.clone(), mime_cache.clone());
        let resender = MessageResender::new(
            api.clone(),
            reconciler.clone(),
            store.clone(),
            mime_cache,
            MimeCachePolicy::from(&self.mime_cache),
            self.send.api_domain.clone(),
        );
        let service = ResubmissionService::new(store.clone(), reconciler, resender, self.resubmit);
        let poller = EventPoller::new(api.clone(), ingestor.clone(), service.clone());
        let filter_variable = self.send.active_filter_variable().map(str::to_string);
        let sender = MessageSender::new(api.clone(), DeferredSendQueue::new(scheduler), self.send);

        internal!(level = INFO, "Relay ready");

        Ok(Relay {
            api,
            store,
            ingestor,
            service,
            sender,
            poller,
            filter_variable,
        })
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MAILSYNC_CONFIG` environment variable
/// 2. ./mailsync.config.ron (current working directory)
/// 3. /etc/mailsync/mailsync.config.ron (system-wide config)
///
/// # Errors
///
/// Returns an error if `MAILSYNC_CONFIG` names a missing file, or if none of
/// the default locations exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./mailsync.config.ron"),
        PathBuf::from("/etc/mailsync/mailsync.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
