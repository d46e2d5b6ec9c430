//! Test doubles for the provider API
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use mailsync_common::{EventType, RawEvent, SubmissionId};
use mailsync_delivery::{
    DeliveryReconciler, EventIngestor, EventQuery, MailgunApi, MessageResender, MimeCachePolicy,
    ProviderError, ResubmissionService, ResubmitPolicy, SendOptions, SendParameters, SendResponse,
};
use mailsync_store::{
    EventKey, EventRecord, EventRecordId, EventStore, MemoryEventStore, MemoryMimeCache,
    MemorySubmissionStore, MimeCacheConfig, StoreError,
};

pub const DOMAIN: &str = "mg.example.com";
pub const RECIPIENT: &str = "alice@example.com";
pub const MESSAGE_ID: &str = "abc@example.com";
pub const STORAGE_URL: &str = "https://storage.example/messages/abc";
pub const MIME: &[u8] = b"From: shop@example.com\r\nTo: alice@example.com\r\nSubject: Order\r\n\r\nThanks\r\n";

/// A `send_mime` call as received by [`FakeMailgun`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeSend {
    pub domain: String,
    pub recipients: Vec<String>,
    pub mime: Vec<u8>,
    pub options: SendOptions,
}

#[derive(Debug)]
struct State {
    sends: Vec<(String, SendParameters)>,
    mime_sends: Vec<MimeSend>,
    event_queries: Vec<EventQuery>,
    stored_mime: Option<Vec<u8>>,
    events: Vec<RawEvent>,
    send_id: Option<String>,
}

/// Records every call and answers from canned data.
#[derive(Debug, Clone)]
pub struct FakeMailgun {
    state: Arc<Mutex<State>>,
}

impl Default for FakeMailgun {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMailgun {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                sends: Vec::new(),
                mime_sends: Vec::new(),
                event_queries: Vec::new(),
                stored_mime: Some(MIME.to_vec()),
                events: Vec::new(),
                send_id: Some("<resent.1@mg.example.com>".to_string()),
            })),
        }
    }

    /// Provider storage has expired.
    pub fn without_stored_mime(self) -> Self {
        self.state.lock().unwrap().stored_mime = None;
        self
    }

    /// Sends are accepted but no message id comes back.
    pub fn without_send_id(self) -> Self {
        self.state.lock().unwrap().send_id = None;
        self
    }

    /// Events returned by events queries, filtered by event type.
    pub fn with_events(self, events: Vec<RawEvent>) -> Self {
        self.state.lock().unwrap().events = events;
        self
    }

    pub fn sends(&self) -> Vec<(String, SendParameters)> {
        self.state.lock().unwrap().sends.clone()
    }

    pub fn mime_sends(&self) -> Vec<MimeSend> {
        self.state.lock().unwrap().mime_sends.clone()
    }

    pub fn event_queries(&self) -> Vec<EventQuery> {
        self.state.lock().unwrap().event_queries.clone()
    }
}

#[async_trait]
impl MailgunApi for FakeMailgun {
    async fn send(
        &self,
        domain: &str,
        params: &SendParameters,
    ) -> Result<SendResponse, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.sends.push((domain.to_string(), params.clone()));

        Ok(SendResponse {
            id: state.send_id.clone(),
            message: "Queued. Thank you.".to_string(),
        })
    }

    async fn send_mime(
        &self,
        domain: &str,
        recipients: &[String],
        mime: &[u8],
        options: &SendOptions,
    ) -> Result<SendResponse, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.mime_sends.push(MimeSend {
            domain: domain.to_string(),
            recipients: recipients.to_vec(),
            mime: mime.to_vec(),
            options: options.clone(),
        });

        Ok(SendResponse {
            id: state.send_id.clone(),
            message: "Queued. Thank you.".to_string(),
        })
    }

    async fn show_mime(&self, storage_url: &str) -> Result<Vec<u8>, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .stored_mime
            .clone()
            .ok_or_else(|| ProviderError::NotFound(storage_url.to_string()))
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.event_queries.push(query.clone());
        Ok(state
            .events
            .iter()
            .filter(|event| query.event.is_none_or(|kind| kind == event.event))
            .cloned()
            .collect())
    }
}

/// A [`MemoryEventStore`] whose recipient lookups can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryEventStore,
    fail_lookups: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn save(&self, record: &mut EventRecord) -> mailsync_store::Result<EventRecordId> {
        self.inner.save(record).await
    }

    async fn find(&self, key: &EventKey) -> mailsync_store::Result<Option<EventRecord>> {
        self.inner.find(key).await
    }

    async fn get(&self, id: &EventRecordId) -> mailsync_store::Result<EventRecord> {
        self.inner.get(id).await
    }

    async fn list(&self) -> mailsync_store::Result<Vec<EventRecordId>> {
        self.inner.list().await
    }

    async fn for_recipient(
        &self,
        submission_id: Option<SubmissionId>,
        recipient: &str,
    ) -> mailsync_store::Result<Vec<EventRecord>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("lookup unavailable".to_string()));
        }
        self.inner.for_recipient(submission_id, recipient).await
    }
}

/// A delivered event for [`MESSAGE_ID`] and [`RECIPIENT`].
pub fn delivered_event() -> RawEvent {
    RawEvent::parse(
        br#"{
            "id": "evt-delivered",
            "timestamp": 1715774400.5,
            "event": "delivered",
            "recipient": "alice@example.com",
            "user-variables": { "s": "42" },
            "message": { "headers": { "message-id": "abc@example.com" } }
        }"#,
    )
    .unwrap()
}

/// A permanent failure for [`MESSAGE_ID`] and [`RECIPIENT`], with stored content.
pub fn failed_event(event_id: &str) -> RawEvent {
    let body = serde_json::json!({
        "id": event_id,
        "timestamp": 1_715_774_400.0,
        "event": "failed",
        "severity": "permanent",
        "recipient": RECIPIENT,
        "delivery-status": { "code": 550, "message": "mailbox unavailable" },
        "storage": { "url": STORAGE_URL },
        "message": { "headers": { "message-id": MESSAGE_ID } }
    });

    RawEvent::parse(body.to_string().as_bytes()).unwrap()
}

/// An unsaved failed record for [`RECIPIENT`] in submission 42.
pub fn failed_record(event_id: &str) -> EventRecord {
    EventRecord {
        event_id: event_id.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
        submission_id: Some(SubmissionId::new(42)),
        event_type: EventType::Failed,
        recipient: RECIPIENT.to_string(),
        message_id: MESSAGE_ID.to_string(),
        storage_url: Some(STORAGE_URL.to_string()),
        timestamp: 1_715_774_400.0,
        ..Default::default()
    }
}

/// A resubmission service wired to in-memory stores and a [`FakeMailgun`].
pub struct Harness {
    pub api: FakeMailgun,
    pub store: MemoryEventStore,
    pub flaky: FlakyStore,
    pub mime_cache: MemoryMimeCache,
    pub ingestor: EventIngestor,
    pub reconciler: DeliveryReconciler,
    pub service: ResubmissionService,
}

impl Harness {
    pub fn new(api: FakeMailgun) -> Self {
        Self::with_config(api, ResubmitPolicy::default(), &MimeCacheConfig::default())
    }

    pub fn with_config(api: FakeMailgun, policy: ResubmitPolicy, cache: &MimeCacheConfig) -> Self {
        let store = MemoryEventStore::new();
        let flaky = FlakyStore {
            inner: store.clone(),
            fail_lookups: Arc::default(),
        };
        let mime_cache = MemoryMimeCache::new();
        let submissions = MemorySubmissionStore::new();

        let shared_api: Arc<dyn MailgunApi> = Arc::new(api.clone());
        let shared_store: Arc<dyn EventStore> = Arc::new(flaky.clone());

        let ingestor = EventIngestor::new(shared_store.clone(), Arc::new(submissions));
        let reconciler = DeliveryReconciler::new(
            shared_api.clone(),
            ingestor.clone(),
            Arc::new(mime_cache.clone()),
        );
        let resender = MessageResender::new(
            shared_api,
            reconciler.clone(),
            shared_store.clone(),
            Arc::new(mime_cache.clone()),
            MimeCachePolicy::from(cache),
            DOMAIN,
        );
        let service = ResubmissionService::new(shared_store, reconciler.clone(), resender, policy);

        Self {
            api,
            store,
            flaky,
            mime_cache,
            ingestor,
            reconciler,
            service,
        }
    }

    /// Save `record` and return it with its id assigned.
    pub async fn saved(&self, mut record: EventRecord) -> EventRecord {
        self.store.save(&mut record).await.unwrap();
        record
    }
}
