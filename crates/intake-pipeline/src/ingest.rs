//! Ingestion validator
//!
//! Turns object-created events into metadata records. Each event yields
//! exactly one store write or one rejection publish, never both.

use chrono::Utc;
use futures::future::join_all;
use intake_core::{
    extract_extension, ExtensionAllowList, FileMetadataRecord, Notification,
    NotificationChannel, ObjectCreatedEvent, PipelineConfig, PipelineError,
};
use intake_store::{MetadataStore, StoreError};
use std::sync::Arc;

use crate::outcome::{log_failure, BatchResult, IngestOutcome};

pub struct IngestionValidator {
    store: Arc<dyn MetadataStore>,
    channel: Arc<dyn NotificationChannel>,
    allowed_extensions: ExtensionAllowList,
    retention: chrono::Duration,
}

impl IngestionValidator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        channel: Arc<dyn NotificationChannel>,
        allowed_extensions: ExtensionAllowList,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            store,
            channel,
            allowed_extensions,
            retention,
        }
    }

    pub fn from_config(
        store: Arc<dyn MetadataStore>,
        channel: Arc<dyn NotificationChannel>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            store,
            channel,
            config.allowed_extensions.clone(),
            config.record_ttl(),
        )
    }

    /// Process a batch of events concurrently. Outcomes keep input order and
    /// a failure never stops sibling events.
    #[tracing::instrument(skip(self, events), fields(batch_size = events.len()))]
    pub async fn process_batch(&self, events: &[ObjectCreatedEvent]) -> BatchResult<IngestOutcome> {
        let outcomes = join_all(events.iter().map(|event| self.process_event(event))).await;

        let result = BatchResult::new(outcomes);
        tracing::info!(
            events = result.len(),
            failures = result.failure_count(),
            "Ingestion batch processed"
        );
        result
    }

    pub async fn process_event(&self, event: &ObjectCreatedEvent) -> IngestOutcome {
        let object_key = event.object_key.as_str();
        let extension = extract_extension(object_key);

        if !self.allowed_extensions.is_allowed(&extension) {
            return self.reject(object_key, extension).await;
        }

        let record = match FileMetadataRecord::new(
            object_key,
            extension,
            event.object_size,
            Utc::now(),
            self.retention,
        ) {
            Ok(record) => record,
            Err(error) => {
                log_failure(object_key, &error, "Failed to build file metadata record");
                return IngestOutcome::Failed {
                    object_key: object_key.to_string(),
                    error,
                };
            }
        };

        match self.store.put(&record).await {
            Ok(()) => {
                tracing::info!(
                    object_key = %object_key,
                    record_id = %record.id,
                    file_extension = %record.file_extension,
                    file_size = record.file_size,
                    "Stored file metadata"
                );
                IngestOutcome::Stored(record)
            }
            Err(e) => {
                let error = match e {
                    StoreError::DuplicateKey(id) => PipelineError::IntegrityViolation(format!(
                        "record id {} already exists while storing {}",
                        id, object_key
                    )),
                    other => PipelineError::StoreWriteFailure {
                        object_key: object_key.to_string(),
                        reason: other.to_string(),
                    },
                };
                log_failure(object_key, &error, "Failed to store file metadata");
                IngestOutcome::Failed {
                    object_key: object_key.to_string(),
                    error,
                }
            }
        }
    }

    async fn reject(&self, object_key: &str, extension: String) -> IngestOutcome {
        let rejection = PipelineError::ValidationRejected {
            object_key: object_key.to_string(),
            extension: extension.clone(),
        };
        log_failure(object_key, &rejection, "Rejected object with disallowed extension");

        let notification = Notification::rejected(object_key, &extension);
        match self.channel.publish(&notification).await {
            Ok(receipt) => {
                tracing::debug!(
                    object_key = %object_key,
                    message_id = %receipt.message_id,
                    "Rejection notice published"
                );
                IngestOutcome::Rejected {
                    object_key: object_key.to_string(),
                    extension,
                }
            }
            Err(e) => {
                // Nothing was written, so redelivering the event is safe.
                let error = PipelineError::PublishFailure(e.to_string());
                log_failure(object_key, &error, "Failed to publish rejection notice");
                IngestOutcome::Failed {
                    object_key: object_key.to_string(),
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingStore, RecordingChannel, StoreFailure};
    use intake_core::NotificationKind;
    use intake_store::InMemoryStore;

    fn validator(
        store: Arc<dyn MetadataStore>,
        channel: Arc<RecordingChannel>,
    ) -> IngestionValidator {
        IngestionValidator::new(
            store,
            channel,
            ExtensionAllowList::default(),
            chrono::Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn test_allowed_extension_is_stored() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        let validator = validator(store.clone(), channel.clone());

        let outcome = validator
            .process_event(&ObjectCreatedEvent::new("docs/Report.PDF", 1024))
            .await;

        let IngestOutcome::Stored(record) = outcome else {
            panic!("expected stored outcome, got {:?}", outcome);
        };
        assert_eq!(record.file_extension, "pdf");
        assert_eq!(record.file_key, "docs/Report.PDF");
        assert_eq!(record.file_size, 1024);
        assert_eq!(record.ttl - record.upload_timestamp, chrono::Duration::minutes(30));
        assert_eq!(store.len().await, 1);
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_extension_publishes_rejection_only() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        let validator = validator(store.clone(), channel.clone());

        let outcome = validator
            .process_event(&ObjectCreatedEvent::new("malware.exe", 50))
            .await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                object_key: "malware.exe".to_string(),
                extension: "exe".to_string(),
            }
        );
        assert!(store.is_empty().await);
        let published = channel.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, NotificationKind::Rejected);
        assert!(published[0].message.contains("exe"));
    }

    #[tokio::test]
    async fn test_key_without_separator_uses_whole_key() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        let validator = validator(store.clone(), channel.clone());

        // Whole key is the extension, and "pdf" is allowed.
        let outcome = validator.process_event(&ObjectCreatedEvent::new("pdf", 1)).await;
        assert!(matches!(outcome, IngestOutcome::Stored(_)));

        let outcome = validator.process_event(&ObjectCreatedEvent::new("README", 1)).await;
        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                object_key: "README".to_string(),
                extension: "readme".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_rejection_publish_failure_is_retryable() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::failing();
        let validator = validator(store.clone(), channel);

        let outcome = validator
            .process_event(&ObjectCreatedEvent::new("virus.bat", 10))
            .await;

        let IngestOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(matches!(error, PipelineError::PublishFailure(_)));
        assert!(error.is_recoverable());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_is_isolated_per_event() {
        let store = Arc::new(FailingStore::new(StoreFailure::Backend).failing_keys(["b.png"]));
        let channel = RecordingChannel::new();
        let validator = validator(store.clone(), channel);

        let events = vec![
            ObjectCreatedEvent::new("a.pdf", 1),
            ObjectCreatedEvent::new("b.png", 2),
            ObjectCreatedEvent::new("c.jpg", 3),
        ];
        let result = validator.process_batch(&events).await;

        assert_eq!(result.len(), 3);
        assert!(matches!(result.items[0], IngestOutcome::Stored(_)));
        assert!(matches!(
            &result.items[1],
            IngestOutcome::Failed { error: PipelineError::StoreWriteFailure { .. }, .. }
        ));
        assert!(matches!(result.items[2], IngestOutcome::Stored(_)));
        assert_eq!(result.retryable_indices(), vec![1]);
        assert_eq!(store.inner().len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_an_integrity_violation() {
        let store = Arc::new(FailingStore::new(StoreFailure::DuplicateKey).failing_keys(["a.pdf"]));
        let channel = RecordingChannel::new();
        let validator = validator(store, channel);

        let outcome = validator.process_event(&ObjectCreatedEvent::new("a.pdf", 1)).await;

        let IngestOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.error_code(), "INTEGRITY_VIOLATION");
        assert!(!error.is_recoverable());
    }

    #[tokio::test]
    async fn test_retention_overflow_fails_without_storing() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        let validator = IngestionValidator::new(
            store.clone(),
            channel.clone(),
            ExtensionAllowList::default(),
            chrono::Duration::seconds(100_000_000_000_000),
        );

        let outcome = validator.process_event(&ObjectCreatedEvent::new("a.pdf", 1)).await;

        let IngestOutcome::Failed { object_key, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(object_key, "a.pdf");
        assert!(matches!(error, PipelineError::Configuration(_)));
        assert!(!error.is_recoverable());
        assert!(store.is_empty().await);
        assert!(channel.published().is_empty());
    }
}
