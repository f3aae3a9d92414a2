use crate::traits::{ChangeFeed, MetadataStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{ChangeKind, ChangeRecord, FileMetadataRecord, RemovalCause};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct RemovedEntry {
    record: FileMetadataRecord,
    removed_at: DateTime<Utc>,
    claimed: bool,
}

#[derive(Default)]
struct State {
    records: HashMap<Uuid, FileMetadataRecord>,
    changes: Vec<ChangeRecord>,
    last_sequence: u64,
    removed: HashMap<Uuid, RemovedEntry>,
    checkpoints: HashMap<String, u64>,
}

impl State {
    fn append_change(
        &mut self,
        kind: ChangeKind,
        record: &FileMetadataRecord,
        cause: Option<RemovalCause>,
        now: DateTime<Utc>,
    ) {
        self.last_sequence += 1;
        let (previous_image, current_image) = match kind {
            ChangeKind::Remove => (Some(record.clone()), None),
            ChangeKind::Insert | ChangeKind::Modify => (None, Some(record.clone())),
        };
        self.changes.push(ChangeRecord {
            sequence: self.last_sequence,
            kind,
            record_id: record.id,
            previous_image,
            current_image,
            cause,
            recorded_at: now,
        });
    }

    fn remove(&mut self, id: Uuid, cause: RemovalCause, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.remove(&id) else {
            return false;
        };
        self.append_change(ChangeKind::Remove, &record, Some(cause), now);
        self.removed.insert(
            id,
            RemovedEntry {
                record,
                removed_at: now,
                claimed: false,
            },
        );
        true
    }
}

/// In-memory metadata store and change feed
///
/// Everything lives behind one lock so a removal and its change entry are
/// always observed together.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn put(&self, record: &FileMetadataRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.records.contains_key(&record.id) || state.removed.contains_key(&record.id) {
            return Err(StoreError::DuplicateKey(record.id));
        }
        state.records.insert(record.id, record.clone());
        state.append_change(ChangeKind::Insert, record, None, Utc::now());
        Ok(())
    }

    async fn get_by_file_key(&self, file_key: &str) -> StoreResult<Option<FileMetadataRecord>> {
        let now = Utc::now();
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.file_key == file_key && !r.is_expired_at(now))
            .max_by_key(|r| r.upload_timestamp)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.remove(id, RemovalCause::Explicit, Utc::now()))
    }

    async fn remove_expired(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<usize> {
        let mut state = self.state.write().await;

        let mut expired: Vec<(DateTime<Utc>, Uuid)> = state
            .records
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| (r.ttl, r.id))
            .collect();
        expired.sort();
        expired.truncate(limit);

        let recorded_at = Utc::now();
        let mut removed = 0;
        for (_, id) in expired {
            if state.remove(id, RemovalCause::Expired, recorded_at) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn claim_removed(
        &self,
        file_key: &str,
        id: Uuid,
    ) -> StoreResult<Option<FileMetadataRecord>> {
        let mut state = self.state.write().await;
        match state.removed.get_mut(&id) {
            Some(entry) if !entry.claimed && entry.record.file_key == file_key => {
                entry.claimed = true;
                Ok(Some(entry.record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_removed(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.removed.get_mut(&id) {
            entry.claimed = false;
        }
        Ok(())
    }

    async fn purge_history(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let before = state.changes.len();
        state.changes.retain(|c| c.recorded_at >= older_than);
        state.removed.retain(|_, e| e.removed_at >= older_than);
        Ok(before - state.changes.len())
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}

#[async_trait]
impl ChangeFeed for InMemoryStore {
    async fn read_changes(&self, after: u64, limit: usize) -> StoreResult<Vec<ChangeRecord>> {
        let state = self.state.read().await;
        Ok(state
            .changes
            .iter()
            .filter(|c| c.sequence > after)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn load_checkpoint(&self, consumer: &str) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.checkpoints.get(consumer).copied().unwrap_or(0))
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entry = state.checkpoints.entry(consumer.to_string()).or_insert(0);
        *entry = (*entry).max(sequence);
        Ok(())
    }
}
