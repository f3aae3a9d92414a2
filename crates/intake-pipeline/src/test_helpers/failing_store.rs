//! Metadata store wrapper that injects failures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{ChangeRecord, FileMetadataRecord, StoreBackend};
use intake_store::{ChangeFeed, InMemoryStore, MetadataStore, StoreError, StoreResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
    Backend,
    DuplicateKey,
}

/// Delegates to an `InMemoryStore`, failing writes for selected file keys and
/// optionally every removal claim.
pub struct FailingStore {
    inner: InMemoryStore,
    failure: StoreFailure,
    failing_keys: HashSet<String>,
    fail_claims: AtomicBool,
}

impl FailingStore {
    pub fn new(failure: StoreFailure) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failure,
            failing_keys: HashSet::new(),
            fail_claims: AtomicBool::new(false),
        }
    }

    pub fn failing_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn set_fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl MetadataStore for FailingStore {
    async fn put(&self, record: &FileMetadataRecord) -> StoreResult<()> {
        if self.failing_keys.contains(&record.file_key) {
            return Err(match self.failure {
                StoreFailure::Backend => StoreError::Backend("injected write failure".to_string()),
                StoreFailure::DuplicateKey => StoreError::DuplicateKey(record.id),
            });
        }
        self.inner.put(record).await
    }

    async fn get_by_file_key(&self, file_key: &str) -> StoreResult<Option<FileMetadataRecord>> {
        self.inner.get_by_file_key(file_key).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn remove_expired(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<usize> {
        self.inner.remove_expired(now, limit).await
    }

    async fn claim_removed(
        &self,
        file_key: &str,
        id: Uuid,
    ) -> StoreResult<Option<FileMetadataRecord>> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected lookup failure".to_string()));
        }
        self.inner.claim_removed(file_key, id).await
    }

    async fn release_removed(&self, id: Uuid) -> StoreResult<()> {
        self.inner.release_removed(id).await
    }

    async fn purge_history(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        self.inner.purge_history(older_than).await
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}

#[async_trait]
impl ChangeFeed for FailingStore {
    async fn read_changes(&self, after: u64, limit: usize) -> StoreResult<Vec<ChangeRecord>> {
        self.inner.read_changes(after, limit).await
    }

    async fn load_checkpoint(&self, consumer: &str) -> StoreResult<u64> {
        self.inner.load_checkpoint(consumer).await
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> StoreResult<()> {
        self.inner.save_checkpoint(consumer, sequence).await
    }
}
