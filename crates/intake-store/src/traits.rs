//! Store abstraction traits
//!
//! `MetadataStore` holds the records; `ChangeFeed` exposes the ordered log of
//! mutations to them. Every backend implements both over the same data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{ChangeRecord, FileMetadataRecord, StoreBackend};
use thiserror::Error;
use uuid::Uuid;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record id already exists: {0}")]
    DuplicateKey(Uuid),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed metadata record store
///
/// Records are never modified in place. Each removal, explicit or by expiry,
/// appends exactly one `REMOVE` change carrying the record's last image.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateKey` when the id exists.
    async fn put(&self, record: &FileMetadataRecord) -> StoreResult<()>;

    /// Most recent live record for a file key.
    ///
    /// Records whose `ttl` has passed are invisible even before the sweep
    /// removes them.
    async fn get_by_file_key(&self, file_key: &str) -> StoreResult<Option<FileMetadataRecord>>;

    /// Remove a record by id. Returns `false` when nothing was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Remove up to `limit` records whose `ttl` is at or before `now`.
    async fn remove_expired(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<usize>;

    /// Take the retained image of a removed record.
    ///
    /// Succeeds at most once per removal; later calls return `None` until the
    /// claim is released. Backends shared between processes may let a claim
    /// lapse after a lease so a crashed consumer does not strand the image.
    async fn claim_removed(
        &self,
        file_key: &str,
        id: Uuid,
    ) -> StoreResult<Option<FileMetadataRecord>>;

    /// Undo a claim so a redelivered event can take the image again.
    async fn release_removed(&self, id: Uuid) -> StoreResult<()>;

    /// Evict change history recorded before `older_than`.
    async fn purge_history(&self, older_than: DateTime<Utc>) -> StoreResult<usize>;

    /// Get the store backend type
    fn backend_type(&self) -> StoreBackend;
}

/// Ordered change log with per-consumer checkpoints
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Changes with a sequence strictly greater than `after`, ascending.
    async fn read_changes(&self, after: u64, limit: usize) -> StoreResult<Vec<ChangeRecord>>;

    /// Last acknowledged sequence for `consumer`, 0 when none.
    async fn load_checkpoint(&self, consumer: &str) -> StoreResult<u64>;

    /// Persist `sequence` for `consumer`. Never moves a checkpoint backwards.
    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> StoreResult<()>;
}
