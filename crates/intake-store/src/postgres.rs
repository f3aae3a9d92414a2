//! Postgres metadata store and change feed
//!
//! Three tables share the configured prefix:
//!
//! - `{table}`: live records
//! - `{table}_changes`: ordered change log (`BIGSERIAL` sequence) with JSONB images
//! - `{table}_checkpoints`: last acknowledged sequence per consumer
//!
//! A removal and its change row are written in the same transaction.

use crate::traits::{ChangeFeed, MetadataStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::validation::is_valid_table_identifier;
use intake_core::{ChangeKind, ChangeRecord, FileMetadataRecord, RemovalCause, StoreConfig};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, file_key, file_extension, file_size, upload_timestamp, ttl";
/// A REMOVE change stays claimed this long before another consumer may take it.
const CLAIM_LEASE_SECS: f64 = 300.0;
/// Transaction-scoped, so it is held until commit and re-entrant for batches.
const CHANGE_LOG_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    file_key: String,
    file_extension: String,
    file_size: i64,
    upload_timestamp: DateTime<Utc>,
    ttl: DateTime<Utc>,
}

impl TryFrom<RecordRow> for FileMetadataRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let file_size = u64::try_from(row.file_size).map_err(|_| {
            StoreError::Backend(format!(
                "Record {} has negative file_size {}",
                row.id, row.file_size
            ))
        })?;
        Ok(FileMetadataRecord {
            id: row.id,
            file_key: row.file_key,
            file_extension: row.file_extension,
            file_size,
            upload_timestamp: row.upload_timestamp,
            ttl: row.ttl,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChangeRow {
    sequence: i64,
    record_id: Uuid,
    change_kind: String,
    removal_cause: Option<String>,
    previous_image: Option<Json<FileMetadataRecord>>,
    current_image: Option<Json<FileMetadataRecord>>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<ChangeRow> for ChangeRecord {
    type Error = StoreError;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        let kind = row
            .change_kind
            .parse::<ChangeKind>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let cause = row
            .removal_cause
            .map(|c| c.parse::<RemovalCause>())
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(ChangeRecord {
            sequence: u64::try_from(row.sequence).unwrap_or(0),
            kind,
            record_id: row.record_id,
            previous_image: row.previous_image.map(|j| j.0),
            current_image: row.current_image.map(|j| j.0),
            cause,
            recorded_at: row.recorded_at,
        })
    }
}

fn file_size_param(record: &FileMetadataRecord) -> StoreResult<i64> {
    i64::try_from(record.file_size).map_err(|_| {
        StoreError::Backend(format!(
            "file_size {} for {} exceeds BIGINT range",
            record.file_size, record.file_key
        ))
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Change-log writers serialize on this key so sequence numbers become
/// visible in allocation order and a reader never skips a late commit.
fn change_log_lock_key(table: &str) -> String {
    format!("{}_changes", table)
}

fn claim_statement(table: &str) -> String {
    format!(
        r#"
        UPDATE {t}_changes SET claimed_at = NOW()
        WHERE sequence = (
            SELECT sequence FROM {t}_changes
            WHERE record_id = $1
              AND change_kind = 'REMOVE'
              AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $3))
              AND previous_image->>'fileKey' = $2
            ORDER BY sequence DESC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING previous_image
        "#,
        t = table
    )
}

/// DDL for the store tables, in execution order.
fn schema_statements(table: &str) -> Vec<String> {
    vec![
        format!(
            r#"CREATE TABLE IF NOT EXISTS {t} (
                id UUID PRIMARY KEY,
                file_key TEXT NOT NULL,
                file_extension TEXT NOT NULL,
                file_size BIGINT NOT NULL CHECK (file_size >= 0),
                upload_timestamp TIMESTAMPTZ NOT NULL,
                ttl TIMESTAMPTZ NOT NULL
            )"#,
            t = table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {t}_key_idx ON {t} (file_key, upload_timestamp DESC)",
            t = table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {t}_ext_idx ON {t} (file_extension)",
            t = table
        ),
        format!("CREATE INDEX IF NOT EXISTS {t}_ttl_idx ON {t} (ttl)", t = table),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {t}_changes (
                sequence BIGSERIAL PRIMARY KEY,
                record_id UUID NOT NULL,
                change_kind TEXT NOT NULL,
                removal_cause TEXT,
                previous_image JSONB,
                current_image JSONB,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                claimed_at TIMESTAMPTZ
            )"#,
            t = table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {t}_chg_record_idx ON {t}_changes (record_id)",
            t = table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {t}_chg_time_idx ON {t}_changes (recorded_at)",
            t = table
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {t}_checkpoints (
                consumer TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
            t = table
        ),
    ]
}

/// Postgres-backed metadata store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    table: String,
}

impl PostgresStore {
    /// Wrap an existing pool. The table name is spliced into SQL and must be
    /// a plain lower-case identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> StoreResult<Self> {
        let table = table.into();
        if !is_valid_table_identifier(&table) {
            return Err(StoreError::ConfigError(format!(
                "Invalid metadata table name: {}",
                table
            )));
        }
        Ok(Self { pool, table })
    }

    /// Connect using store configuration and create the schema if missing.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::ConfigError("DATABASE_URL not configured".to_string()))?;

        tracing::info!("Connecting to metadata store database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.timeout_seconds))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await?;

        let store = Self::new(pool, config.table_name.clone())?;
        store.ensure_schema().await?;

        tracing::info!(
            table = %store.table,
            max_connections = config.max_connections,
            "Metadata store connected"
        );
        Ok(store)
    }

    /// Idempotently create tables and indexes.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in schema_statements(&self.table) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: ChangeKind,
        record: &FileMetadataRecord,
        cause: Option<RemovalCause>,
    ) -> StoreResult<()> {
        let (previous_image, current_image) = match kind {
            ChangeKind::Remove => (Some(Json(record)), None),
            ChangeKind::Insert | ChangeKind::Modify => (None, Some(Json(record))),
        };
        sqlx::query(CHANGE_LOG_LOCK_SQL)
            .bind(change_log_lock_key(&self.table))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {}_changes (record_id, change_kind, removal_cause, previous_image, current_image)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            self.table
        ))
        .bind(record.id)
        .bind(kind.to_string())
        .bind(cause.map(|c| c.to_string()))
        .bind(previous_image)
        .bind(current_image)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    #[tracing::instrument(skip(self, record), fields(db.table = %self.table, record_id = %record.id))]
    async fn put(&self, record: &FileMetadataRecord) -> StoreResult<()> {
        let file_size = file_size_param(record)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            self.table, RECORD_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.file_key)
        .bind(&record.file_extension)
        .bind(file_size)
        .bind(record.upload_timestamp)
        .bind(record.ttl)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::DuplicateKey(record.id));
            }
            Err(e) => return Err(e.into()),
        }

        self.insert_change(&mut tx, ChangeKind::Insert, record, None)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table))]
    async fn get_by_file_key(&self, file_key: &str) -> StoreResult<Option<FileMetadataRecord>> {
        let row: Option<RecordRow> = sqlx::query_as::<Postgres, RecordRow>(&format!(
            r#"
            SELECT {} FROM {}
            WHERE file_key = $1 AND ttl > NOW()
            ORDER BY upload_timestamp DESC
            LIMIT 1
            "#,
            RECORD_COLUMNS, self.table
        ))
        .bind(file_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FileMetadataRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, record_id = %id))]
    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RecordRow> = sqlx::query_as::<Postgres, RecordRow>(&format!(
            "DELETE FROM {} WHERE id = $1 RETURNING {}",
            self.table, RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let record = FileMetadataRecord::try_from(row)?;
        self.insert_change(&mut tx, ChangeKind::Remove, &record, Some(RemovalCause::Explicit))
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table))]
    async fn remove_expired(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<RecordRow> = sqlx::query_as::<Postgres, RecordRow>(&format!(
            r#"
            DELETE FROM {t} WHERE id IN (
                SELECT id FROM {t}
                WHERE ttl <= $1
                ORDER BY ttl
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {cols}
            "#,
            t = self.table,
            cols = RECORD_COLUMNS
        ))
        .bind(now)
        .bind(to_i64(limit as u64))
        .fetch_all(&mut *tx)
        .await?;

        let removed = rows.len();
        for row in rows {
            let record = FileMetadataRecord::try_from(row)?;
            self.insert_change(&mut tx, ChangeKind::Remove, &record, Some(RemovalCause::Expired))
                .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table, record_id = %id))]
    async fn claim_removed(
        &self,
        file_key: &str,
        id: Uuid,
    ) -> StoreResult<Option<FileMetadataRecord>> {
        let row: Option<(Option<Json<FileMetadataRecord>>,)> =
            sqlx::query_as(&claim_statement(&self.table))
                .bind(id)
                .bind(file_key)
                .bind(CLAIM_LEASE_SECS)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(image,)| image.map(|j| j.0)))
    }

    async fn release_removed(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(&format!(
            "UPDATE {}_changes SET claimed_at = NULL WHERE record_id = $1 AND change_kind = 'REMOVE'",
            self.table
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = %self.table))]
    async fn purge_history(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let result = sqlx::query(&format!(
            "DELETE FROM {}_changes WHERE recorded_at < $1",
            self.table
        ))
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Postgres
    }
}

#[async_trait]
impl ChangeFeed for PostgresStore {
    async fn read_changes(&self, after: u64, limit: usize) -> StoreResult<Vec<ChangeRecord>> {
        let rows: Vec<ChangeRow> = sqlx::query_as::<Postgres, ChangeRow>(&format!(
            r#"
            SELECT sequence, record_id, change_kind, removal_cause,
                   previous_image, current_image, recorded_at
            FROM {}_changes
            WHERE sequence > $1
            ORDER BY sequence
            LIMIT $2
            "#,
            self.table
        ))
        .bind(to_i64(after))
        .bind(to_i64(limit as u64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChangeRecord::try_from).collect()
    }

    async fn load_checkpoint(&self, consumer: &str) -> StoreResult<u64> {
        let sequence: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT sequence FROM {}_checkpoints WHERE consumer = $1",
            self.table
        ))
        .bind(consumer)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sequence.and_then(|s| u64::try_from(s).ok()).unwrap_or(0))
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {t}_checkpoints (consumer, sequence)
            VALUES ($1, $2)
            ON CONFLICT (consumer) DO UPDATE
            SET sequence = GREATEST({t}_checkpoints.sequence, EXCLUDED.sequence),
                updated_at = NOW()
            "#,
            t = self.table
        ))
        .bind(consumer)
        .bind(to_i64(sequence))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
