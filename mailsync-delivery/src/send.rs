//! Outbound sends through the provider

use std::sync::Arc;

use mailsync_common::{outgoing, webhook::WEBHOOK_FILTER_VARIABLE};
use serde::Deserialize;

use crate::{
    DeferredSendQueue, JobHandle, MailgunApi, SendParameters, SendResponse, SyncError,
    queue::SendMode,
};

/// Outbound send settings
///
/// ```ron
/// Mailsync (
///     send: (
///         api_domain: "mg.example.com",
///         send_via_job: "when-attachments",
///         send_in: "5 minutes",
///         default_recipient: Some("postmaster@example.com"),
///         redact_headers: ["X-Originating-Script"],
///         webhooks_enabled: true,
///         webhook_filter_variable: Some("production"),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendConfig {
    /// Provider sending domain
    #[serde(default)]
    pub api_domain: String,

    #[serde(default)]
    pub send_via_job: SendMode,

    /// Delay for queued sends, e.g. `"2 minutes"`; one minute when empty
    #[serde(default)]
    pub send_in: String,

    /// Set the `Sender` header from `from` when not already present
    #[serde(default = "defaults::always_set_sender")]
    pub always_set_sender: bool,

    /// Send everything in provider test mode
    #[serde(default)]
    pub test_mode: bool,

    /// Recipient used when a message has no `to` addresses
    #[serde(default)]
    pub default_recipient: Option<String>,

    /// Headers stripped from every message, matched case-insensitively
    #[serde(default)]
    pub redact_headers: Vec<String>,

    #[serde(default)]
    pub webhooks_enabled: bool,

    /// Value sent as the `wfv` variable so webhooks for other installations
    /// sharing the provider account can be told apart
    #[serde(default)]
    pub webhook_filter_variable: Option<String>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            api_domain: String::new(),
            send_via_job: SendMode::default(),
            send_in: String::new(),
            always_set_sender: defaults::always_set_sender(),
            test_mode: false,
            default_recipient: None,
            redact_headers: Vec::new(),
            webhooks_enabled: false,
            webhook_filter_variable: None,
        }
    }
}

impl SendConfig {
    /// The filter variable to stamp on outgoing mail, if webhooks are in use.
    #[must_use]
    pub fn active_filter_variable(&self) -> Option<&str> {
        self.webhook_filter_variable
            .as_deref()
            .filter(|variable| self.webhooks_enabled && !variable.is_empty())
    }
}

mod defaults {
    pub const fn always_set_sender() -> bool {
        true
    }
}

/// Result of [`MessageSender::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(SendResponse),
    Queued(JobHandle),
}

/// Applies the configured send rules and hands messages to the provider.
#[derive(Debug, Clone)]
pub struct MessageSender {
    api: Arc<dyn MailgunApi>,
    queue: DeferredSendQueue,
    config: SendConfig,
}

impl MessageSender {
    #[must_use]
    pub fn new(api: Arc<dyn MailgunApi>, queue: DeferredSendQueue, config: SendConfig) -> Self {
        Self { api, queue, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SendConfig {
        &self.config
    }

    /// Apply the configured rules to `params`.
    #[must_use]
    pub fn prepare(&self, mut params: SendParameters) -> SendParameters {
        if self.config.always_set_sender
            && params.header("Sender").is_none()
            && let Some(from) = params.from.clone().filter(|from| !from.is_empty())
        {
            params.headers.insert("Sender".to_string(), from);
            params
                .headers
                .insert("X-Auto-SetSender".to_string(), "1".to_string());
        }

        for header in &self.config.redact_headers {
            params.remove_header(header);
        }

        if self.config.test_mode {
            params.options.test_mode = Some(true);
        }

        if params.to.is_empty()
            && let Some(recipient) = &self.config.default_recipient
        {
            params.to.push(recipient.clone());
        }

        if let Some(variable) = self.config.active_filter_variable() {
            params
                .variables
                .insert(WEBHOOK_FILTER_VARIABLE.to_string(), variable.to_string());
        }

        params
    }

    /// Send a message now or queue it, depending on the configured mode.
    #[tracing::instrument(level = "debug", skip_all, fields(subject = %params.subject))]
    pub async fn send(&self, params: SendParameters) -> Result<SendOutcome, SyncError> {
        let params = self.prepare(params);

        if self.config.send_via_job.should_queue(&params) {
            let handle = self
                .queue
                .enqueue(&self.config.api_domain, params, &self.config.send_in)
                .await?;
            return Ok(SendOutcome::Queued(handle));
        }

        outgoing!(
            level = DEBUG,
            "Sending message to {} recipient(s) via {}",
            params.to.len(),
            self.config.api_domain
        );
        let response = self.api.send(&self.config.api_domain, &params).await?;

        Ok(SendOutcome::Sent(response))
    }
}
