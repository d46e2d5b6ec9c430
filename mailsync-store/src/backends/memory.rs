use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use mailsync_common::SubmissionId;

use crate::{
    EventKey, EventRecord, EventRecordId, EventStore, MimeCache, MimeFileName, StoreError,
};

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<EventRecordId, EventRecord>,
    by_key: HashMap<EventKey, EventRecordId>,
}

/// In-memory event store
///
/// Records and the key index share one `RwLock`, so the key lookup and the
/// insert of a save happen atomically. Intended for tests and development.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    records: Arc<RwLock<Records>>,
    /// Maximum number of records to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Recovers gracefully if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .by_id
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save(&self, record: &mut EventRecord) -> crate::Result<EventRecordId> {
        let mut records = self.records.write()?;
        let key = record.key();

        let id = match record.id.or_else(|| records.by_key.get(&key).copied()) {
            Some(id) => id,
            None => {
                if let Some(capacity) = self.capacity
                    && records.by_id.len() >= capacity
                {
                    return Err(StoreError::CapacityExceeded {
                        len: records.by_id.len(),
                        capacity,
                    });
                }
                EventRecordId::generate()
            }
        };

        record.id = Some(id);

        if let Some(previous) = records.by_id.insert(id, record.clone()) {
            let previous_key = previous.key();
            if previous_key != key {
                records.by_key.remove(&previous_key);
            }
        }
        records.by_key.insert(key, id);

        Ok(id)
    }

    async fn find(&self, key: &EventKey) -> crate::Result<Option<EventRecord>> {
        let records = self.records.read()?;
        Ok(records
            .by_key
            .get(key)
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }

    async fn get(&self, id: &EventRecordId) -> crate::Result<EventRecord> {
        self.records
            .read()?
            .by_id
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn list(&self) -> crate::Result<Vec<EventRecordId>> {
        let mut ids: Vec<_> = self.records.read()?.by_id.keys().copied().collect();

        // ULIDs are lexicographically sortable by creation time
        ids.sort();

        Ok(ids)
    }

    async fn for_recipient(
        &self,
        submission_id: Option<SubmissionId>,
        recipient: &str,
    ) -> crate::Result<Vec<EventRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()?
            .by_id
            .values()
            .filter(|record| record.same_recipient(submission_id, recipient))
            .cloned()
            .collect();

        records.sort_by_key(|record| record.id);

        Ok(records)
    }
}

/// In-memory MIME cache, used when no cache directory is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryMimeCache {
    blobs: Arc<RwLock<HashMap<MimeFileName, Arc<[u8]>>>>,
}

impl MemoryMimeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MimeCache for MemoryMimeCache {
    async fn write(&self, content: &[u8]) -> crate::Result<MimeFileName> {
        let name = MimeFileName::generate();
        self.blobs
            .write()?
            .insert(name.clone(), Arc::from(content));
        Ok(name)
    }

    async fn read(&self, name: &MimeFileName) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.blobs.read()?.get(name).map(|blob| blob.to_vec()))
    }

    async fn exists(&self, name: &MimeFileName) -> crate::Result<bool> {
        Ok(self.blobs.read()?.contains_key(name))
    }

    async fn remove(&self, name: &MimeFileName) -> crate::Result<()> {
        self.blobs
            .write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::MimeNotFound(name.clone()))
    }
}
