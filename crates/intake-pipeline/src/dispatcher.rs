//! Change dispatcher
//!
//! Reads the store's change log from a persisted checkpoint, keeps only
//! `REMOVE` changes, and hands them to the notifier in small batches. The
//! checkpoint only advances past a change once it no longer needs a retry, so
//! delivery to the notifier is at-least-once.

use intake_core::{DispatcherConfig, RemovalEvent};
use intake_store::{ChangeFeed, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::notifier::Notifier;
use crate::outcome::NotifyOutcome;
use crate::task::BackgroundTask;

/// Counts from one poll of the change log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub read: usize,
    pub removals: usize,
    pub published: usize,
    pub no_metadata: usize,
    pub failed: usize,
    pub checkpoint: u64,
}

pub struct ChangeDispatcher {
    feed: Arc<dyn ChangeFeed>,
    notifier: Arc<Notifier>,
    config: DispatcherConfig,
    /// Failed attempts per change sequence not yet acknowledged.
    attempts: Mutex<HashMap<u64, u32>>,
}

impl ChangeDispatcher {
    pub fn new(feed: Arc<dyn ChangeFeed>, notifier: Arc<Notifier>, config: DispatcherConfig) -> Self {
        Self {
            feed,
            notifier,
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record one more failed attempt; returns the total so far.
    fn record_failure(&self, sequence: u64) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(sequence).or_insert(0);
        *count += 1;
        *count
    }

    fn forget(&self, sequence: u64) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(&sequence);
    }

    /// Process everything currently readable past the checkpoint.
    #[tracing::instrument(skip(self), fields(consumer = %self.config.consumer_name))]
    pub async fn poll_once(&self) -> StoreResult<PollReport> {
        let consumer = self.config.consumer_name.as_str();
        let checkpoint = self.feed.load_checkpoint(consumer).await?;
        let changes = self
            .feed
            .read_changes(checkpoint, self.config.read_limit.max(1))
            .await?;

        let mut report = PollReport {
            read: changes.len(),
            checkpoint,
            ..PollReport::default()
        };
        let Some(last_read) = changes.last().map(|c| c.sequence) else {
            return Ok(report);
        };

        let removals: Vec<RemovalEvent> = changes
            .into_iter()
            .filter_map(|change| change.into_removal())
            .collect();
        report.removals = removals.len();

        // Earliest change that must be read again on the next poll.
        let mut blocked_at: Option<u64> = None;

        for chunk in removals.chunks(self.config.batch_size.max(1)) {
            let result = self.notifier.notify_batch(chunk).await;

            for (event, outcome) in chunk.iter().zip(result.items) {
                match outcome {
                    NotifyOutcome::Published { .. } => {
                        report.published += 1;
                        self.forget(event.sequence);
                    }
                    NotifyOutcome::NoMetadata { .. } => {
                        report.no_metadata += 1;
                        self.forget(event.sequence);
                    }
                    NotifyOutcome::Failed { file_key, error } => {
                        report.failed += 1;
                        if !error.is_recoverable() {
                            self.forget(event.sequence);
                            continue;
                        }
                        let attempts = self.record_failure(event.sequence);
                        if attempts >= self.config.max_attempts {
                            tracing::error!(
                                sequence = event.sequence,
                                file_key = %file_key,
                                attempts = attempts,
                                error = %error,
                                "Giving up on removal notification"
                            );
                            self.forget(event.sequence);
                        } else {
                            blocked_at = Some(match blocked_at {
                                Some(current) => current.min(event.sequence),
                                None => event.sequence,
                            });
                        }
                    }
                }
            }
        }

        let next_checkpoint = match blocked_at {
            Some(sequence) => sequence.saturating_sub(1),
            None => last_read,
        };
        if next_checkpoint > checkpoint {
            self.feed.save_checkpoint(consumer, next_checkpoint).await?;
            report.checkpoint = next_checkpoint;
        }

        if report.removals > 0 {
            tracing::info!(
                read = report.read,
                removals = report.removals,
                published = report.published,
                no_metadata = report.no_metadata,
                failed = report.failed,
                checkpoint = report.checkpoint,
                "Dispatched removal changes"
            );
        }
        Ok(report)
    }

    pub fn spawn(self: Arc<Self>) -> BackgroundTask {
        let period = self.config.poll_interval;
        BackgroundTask::spawn_periodic("change-dispatcher", period, move || {
            let dispatcher = self.clone();
            async move {
                if let Err(e) = dispatcher.poll_once().await {
                    tracing::error!(error = %e, "Failed to poll change log");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingChannel;
    use chrono::{Duration, Utc};
    use intake_core::FileMetadataRecord;
    use intake_store::{InMemoryStore, MetadataStore};

    fn dispatcher(
        store: Arc<InMemoryStore>,
        channel: Arc<RecordingChannel>,
        batch_size: usize,
        max_attempts: u32,
    ) -> ChangeDispatcher {
        let notifier = Arc::new(Notifier::new(store.clone(), channel));
        ChangeDispatcher::new(
            store,
            notifier,
            DispatcherConfig {
                batch_size,
                max_attempts,
                ..DispatcherConfig::default()
            },
        )
    }

    async fn put_and_delete(store: &InMemoryStore, key: &str) -> FileMetadataRecord {
        let record = FileMetadataRecord::new(key, "pdf", 10, Utc::now(), Duration::minutes(30))
            .unwrap();
        store.put(&record).await.unwrap();
        store.delete(record.id).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_only_removals_are_dispatched() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        let live = FileMetadataRecord::new("live.pdf", "pdf", 1, Utc::now(), Duration::minutes(30))
            .unwrap();
        store.put(&live).await.unwrap();
        put_and_delete(&store, "a.pdf").await;

        let report = dispatcher(store.clone(), channel.clone(), 2, 5)
            .poll_once()
            .await
            .unwrap();

        assert_eq!(report.read, 3);
        assert_eq!(report.removals, 1);
        assert_eq!(report.published, 1);
        assert_eq!(report.checkpoint, 3);
        assert_eq!(channel.published().len(), 1);
        assert_eq!(store.load_checkpoint("notifier").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_all_removals_processed_across_batches() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        for i in 0..5 {
            put_and_delete(&store, &format!("f{}.pdf", i)).await;
        }

        let dispatcher = dispatcher(store.clone(), channel.clone(), 2, 5);
        let report = dispatcher.poll_once().await.unwrap();
        assert_eq!(report.removals, 5);
        assert_eq!(report.published, 5);

        let again = dispatcher.poll_once().await.unwrap();
        assert_eq!(again.read, 0);
        assert_eq!(channel.published().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_publish_holds_checkpoint_and_retries() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        put_and_delete(&store, "a.pdf").await;
        channel.fail_next(1);

        let dispatcher = dispatcher(store.clone(), channel.clone(), 2, 5);
        let first = dispatcher.poll_once().await.unwrap();
        assert_eq!(first.failed, 1);
        // INSERT at 1 is acknowledged, REMOVE at 2 is held.
        assert_eq!(first.checkpoint, 1);

        let second = dispatcher.poll_once().await.unwrap();
        assert_eq!(second.published, 1);
        assert_eq!(second.checkpoint, 2);
        assert_eq!(channel.published().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_successes_are_no_ops_after_retry() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::new();
        put_and_delete(&store, "a.pdf").await;
        put_and_delete(&store, "b.pdf").await;
        // Single-item batches: a.pdf fails, then b.pdf succeeds.
        channel.fail_next(1);

        let dispatcher = dispatcher(store.clone(), channel.clone(), 1, 5);
        let first = dispatcher.poll_once().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.published, 1);
        assert_eq!(first.checkpoint, 1);

        let second = dispatcher.poll_once().await.unwrap();
        assert_eq!(second.published, 1);
        assert_eq!(second.no_metadata, 1);
        assert_eq!(channel.published().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_change_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let channel = RecordingChannel::failing();
        put_and_delete(&store, "a.pdf").await;

        let dispatcher = dispatcher(store.clone(), channel.clone(), 2, 2);
        assert_eq!(dispatcher.poll_once().await.unwrap().checkpoint, 1);
        assert_eq!(dispatcher.poll_once().await.unwrap().checkpoint, 2);
        assert_eq!(channel.attempts(), 2);

        assert_eq!(dispatcher.poll_once().await.unwrap().read, 0);
    }
}
