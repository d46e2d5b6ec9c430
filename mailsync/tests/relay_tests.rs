//! End-to-end tests for the relay

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use mailsync::{Mailsync, Relay};
use mailsync_common::RawEvent;
use mailsync_delivery::{
    EventQuery, MailgunApi, MemoryScheduler, ProviderError, SendOptions, SendOutcome,
    SendParameters, SendResponse, SyncError,
};
use mailsync_store::{EventStore, MemorySubmissionStore};
use pretty_assertions::assert_eq;

#[derive(Debug, Default)]
struct RecordingApi {
    sends: Mutex<Vec<SendParameters>>,
    /// Returned by the next send instead of accepting it
    failure: Mutex<Option<ProviderError>>,
}

impl RecordingApi {
    fn fail_next_send(&self, error: ProviderError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl MailgunApi for RecordingApi {
    async fn send(
        &self,
        _domain: &str,
        params: &SendParameters,
    ) -> Result<SendResponse, ProviderError> {
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }

        self.sends.lock().unwrap().push(params.clone());
        Ok(SendResponse {
            id: Some("<sent@mg.example.com>".to_string()),
            message: "Queued. Thank you.".to_string(),
        })
    }

    async fn send_mime(
        &self,
        _domain: &str,
        _recipients: &[String],
        _mime: &[u8],
        _options: &SendOptions,
    ) -> Result<SendResponse, ProviderError> {
        Err(ProviderError::Transport("not used".to_string()))
    }

    async fn show_mime(&self, storage_url: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::NotFound(storage_url.to_string()))
    }

    async fn events(&self, _query: &EventQuery) -> Result<Vec<RawEvent>, ProviderError> {
        Ok(Vec::new())
    }
}

fn webhook(event_id: &str, filter: Option<&str>) -> Vec<u8> {
    let mut variables = serde_json::json!({ "s": "7" });
    if let Some(filter) = filter {
        variables["wfv"] = serde_json::Value::from(filter);
    }

    serde_json::json!({
        "signature": { "token": "abc", "timestamp": "1715774400", "signature": "def" },
        "event-data": {
            "id": event_id,
            "timestamp": 1_715_774_400.25,
            "event": "failed",
            "severity": "temporary",
            "recipient": "alice@example.com",
            "reason": "generic",
            "user-variables": variables,
            "message": { "headers": { "message-id": "abc@example.com" } }
        }
    })
    .to_string()
    .into_bytes()
}

async fn relay(config: &str, api: Arc<RecordingApi>, scheduler: &MemoryScheduler) -> Relay {
    let config: Mailsync = ron::from_str(config).unwrap();
    config
        .init(
            api,
            Arc::new(scheduler.clone()),
            Arc::new(MemorySubmissionStore::new()),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_webhook_is_stored_once() {
    let relay = relay("()", Arc::default(), &MemoryScheduler::new()).await;

    let first = relay.handle_webhook(&webhook("evt-1", None)).await.unwrap();
    let second = relay.handle_webhook(&webhook("evt-1", None)).await.unwrap();

    let first = first.unwrap();
    assert_eq!(first.id, second.unwrap().id);
    assert_eq!(first.recipient, "alice@example.com");
    assert_eq!(relay.store().list().await.unwrap().len(), 1);

    let stored = relay.record(&first.id.unwrap()).await.unwrap();
    assert_eq!(stored.message_id, "abc@example.com");
}

#[tokio::test]
async fn test_webhook_filter_variable() {
    let relay = relay(
        r#"(send: (webhooks_enabled: true, webhook_filter_variable: Some("production")))"#,
        Arc::default(),
        &MemoryScheduler::new(),
    )
    .await;

    let ours = relay
        .handle_webhook(&webhook("evt-1", Some("production")))
        .await
        .unwrap();
    let theirs = relay
        .handle_webhook(&webhook("evt-2", Some("staging")))
        .await
        .unwrap();
    let unmarked = relay.handle_webhook(&webhook("evt-3", None)).await.unwrap();

    assert!(ours.is_some());
    assert!(theirs.is_none());
    assert!(unmarked.is_none());
    assert_eq!(relay.store().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_webhook() {
    let relay = relay("()", Arc::default(), &MemoryScheduler::new()).await;

    let result = relay.handle_webhook(b"{not json").await;

    assert!(matches!(result, Err(SyncError::Payload(_))));
}

#[tokio::test]
async fn test_queued_sends_run_when_due() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = MemoryScheduler::new();
    let relay = relay(
        r#"(send: (api_domain: "mg.example.com", send_via_job: "yes"))"#,
        api.clone(),
        &scheduler,
    )
    .await;

    let SendOutcome::Queued(handle) = relay.send(order()).await.unwrap() else {
        panic!("expected the send to be queued");
    };

    let early = relay
        .run_due_jobs(&scheduler, handle.run_at - Duration::seconds(1))
        .await
        .unwrap();
    assert!(early.sent.is_empty());
    assert!(api.sends.lock().unwrap().is_empty());

    let run = relay.run_due_jobs(&scheduler, handle.run_at).await.unwrap();
    assert_eq!(run.sent.len(), 1);
    assert_eq!(run.sent[0].1.id.as_deref(), Some("<sent@mg.example.com>"));
    assert!(run.requeued.is_empty());
    assert!(run.failed.is_empty());

    let sends = api.sends.lock().unwrap();
    assert_eq!(sends[0].subject, "Your order");
    assert_eq!(sends[0].header("Sender"), Some("shop@example.com"));
}

fn order() -> SendParameters {
    SendParameters {
        from: Some("shop@example.com".to_string()),
        to: vec!["alice@example.com".to_string()],
        subject: "Your order".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_transport_failure_requeues_job() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = MemoryScheduler::new();
    let relay = relay(r#"(send: (send_via_job: "yes"))"#, api.clone(), &scheduler).await;

    let SendOutcome::Queued(handle) = relay.send(order()).await.unwrap() else {
        panic!("expected the send to be queued");
    };

    api.fail_next_send(ProviderError::Transport("connection reset".to_string()));
    let run = relay.run_due_jobs(&scheduler, handle.run_at).await.unwrap();

    assert!(run.sent.is_empty());
    assert!(run.failed.is_empty());
    assert_eq!(run.requeued.len(), 1);
    assert_eq!(run.requeued[0].run_at, handle.run_at + Duration::minutes(1));
    assert_eq!(scheduler.pending(), 1);

    let retry = relay
        .run_due_jobs(&scheduler, run.requeued[0].run_at)
        .await
        .unwrap();
    assert_eq!(retry.sent.len(), 1);
    assert_eq!(api.sends.lock().unwrap().len(), 1);
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_rejected_job_is_reported() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = MemoryScheduler::new();
    let relay = relay(r#"(send: (send_via_job: "yes"))"#, api.clone(), &scheduler).await;

    let SendOutcome::Queued(handle) = relay.send(order()).await.unwrap() else {
        panic!("expected the send to be queued");
    };

    api.fail_next_send(ProviderError::Api {
        status: 400,
        message: "'to' parameter is not a valid address".to_string(),
    });
    let run = relay.run_due_jobs(&scheduler, handle.run_at).await.unwrap();

    assert!(run.sent.is_empty());
    assert!(run.requeued.is_empty());
    assert_eq!(run.failed.len(), 1);
    assert_eq!(run.failed[0].0, handle);
    assert!(matches!(
        run.failed[0].1,
        SyncError::Provider(ProviderError::Api { status: 400, .. })
    ));
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_file_store_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events");
    let config_path = dir.path().join("mailsync.config.ron");
    std::fs::write(
        &config_path,
        format!("Mailsync(store: File(path: {:?}))", events.display().to_string()),
    )
    .unwrap();

    let config = Mailsync::load(&config_path).await.unwrap();
    let relay = config
        .init(
            Arc::new(RecordingApi::default()),
            Arc::new(MemoryScheduler::new()),
            Arc::new(MemorySubmissionStore::new()),
        )
        .await
        .unwrap();

    relay.handle_webhook(&webhook("evt-1", None)).await.unwrap();

    assert_eq!(std::fs::read_dir(&events).unwrap().count(), 1);
}

#[tokio::test]
async fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("mailsync.config.ron");
    std::fs::write(&config_path, "Mailsync(store: Nowhere)").unwrap();

    assert!(Mailsync::load(&config_path).await.is_err());
    assert!(Mailsync::load(&dir.path().join("missing.ron")).await.is_err());
}
