//! Removal notifier
//!
//! For each removed record, claims the image the store retained at removal
//! time and publishes a summary of it. The claim succeeds at most once per
//! removal, so a duplicate event finds no metadata and is a logged no-op.

use futures::future::join_all;
use intake_core::{Notification, NotificationChannel, PipelineError, RemovalEvent};
use intake_store::MetadataStore;
use std::sync::Arc;

use crate::outcome::{log_failure, BatchResult, NotifyOutcome};

pub struct Notifier {
    store: Arc<dyn MetadataStore>,
    channel: Arc<dyn NotificationChannel>,
}

impl Notifier {
    pub fn new(store: Arc<dyn MetadataStore>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { store, channel }
    }

    /// Notify a batch of removals concurrently; one failure never affects
    /// its siblings.
    #[tracing::instrument(skip(self, events), fields(batch_size = events.len()))]
    pub async fn notify_batch(&self, events: &[RemovalEvent]) -> BatchResult<NotifyOutcome> {
        let outcomes = join_all(events.iter().map(|event| self.notify(event))).await;
        BatchResult::new(outcomes)
    }

    pub async fn notify(&self, event: &RemovalEvent) -> NotifyOutcome {
        let file_key = event.file_key().to_string();
        let record_id = event.record_id();

        let record = match self.store.claim_removed(&file_key, record_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let miss = PipelineError::StoreLookupMiss {
                    file_key: file_key.clone(),
                };
                log_failure(&file_key, &miss, "No metadata found for file key");
                return NotifyOutcome::NoMetadata { file_key };
            }
            Err(e) => {
                let error = PipelineError::StoreLookupFailure {
                    file_key: file_key.clone(),
                    reason: e.to_string(),
                };
                log_failure(&file_key, &error, "Failed to look up removed metadata");
                return NotifyOutcome::Failed { file_key, error };
            }
        };

        let notification = Notification::removed(&record);
        match self.channel.publish(&notification).await {
            Ok(receipt) => {
                tracing::info!(
                    file_key = %file_key,
                    record_id = %record_id,
                    cause = %event.cause,
                    message_id = %receipt.message_id,
                    delivered = receipt.delivered,
                    "Removal notification published"
                );
                NotifyOutcome::Published { file_key }
            }
            Err(e) => {
                let error = PipelineError::PublishFailure(e.to_string());
                log_failure(&file_key, &error, "Failed to publish removal notification");

                // Give the image back so a redelivered event can try again.
                if let Err(release_err) = self.store.release_removed(record_id).await {
                    tracing::error!(
                        file_key = %file_key,
                        record_id = %record_id,
                        error = %release_err,
                        "Failed to release removal claim; notification will not be retried"
                    );
                }
                NotifyOutcome::Failed { file_key, error }
            }
        }
    }
}
