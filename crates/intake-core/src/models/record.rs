use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Persisted metadata for one ingested object.
///
/// Records are append/expire only: once written they are never updated in
/// place, only removed (explicitly or when `ttl` elapses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataRecord {
    pub id: Uuid,
    pub file_key: String,
    pub file_extension: String,
    pub file_size: u64,
    pub upload_timestamp: DateTime<Utc>,
    pub ttl: DateTime<Utc>,
}

impl FileMetadataRecord {
    /// Build a fresh record with a newly generated id and `ttl = now + retention`.
    ///
    /// Fails when `ttl` would fall outside the representable date range.
    pub fn new(
        file_key: impl Into<String>,
        file_extension: impl Into<String>,
        file_size: u64,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Self, PipelineError> {
        let ttl = now.checked_add_signed(retention).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "retention of {} seconds overflows the record ttl",
                retention.num_seconds()
            ))
        })?;
        Ok(Self {
            id: Uuid::new_v4(),
            file_key: file_key.into(),
            file_extension: file_extension.into(),
            file_size,
            upload_timestamp: now,
            ttl,
        })
    }

    /// A record is expired at or after its `ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl
    }
}
