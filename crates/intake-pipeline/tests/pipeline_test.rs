//! End-to-end flows over the in-memory store.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use intake_core::{
    ChangeKind, DispatcherConfig, Notification, NotificationChannel, NotificationKind,
    ObjectCreatedEvent, PipelineConfig, PublishError, PublishReceipt, RemovalCause,
    SweeperConfig,
};
use intake_pipeline::{
    ChangeDispatcher, ExpirySweeper, IngestOutcome, IngestionValidator, Notifier, NotifyOutcome,
};
use intake_store::{ChangeFeed, InMemoryStore, MetadataStore};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct CollectingChannel {
    published: Mutex<Vec<Notification>>,
}

impl CollectingChannel {
    fn published(&self) -> Vec<Notification> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for CollectingChannel {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn publish(&self, notification: &Notification) -> Result<PublishReceipt, PublishError> {
        self.published.lock().unwrap().push(notification.clone());
        Ok(PublishReceipt {
            message_id: Uuid::new_v4(),
            delivered: 1,
            failed: 0,
        })
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    channel: Arc<CollectingChannel>,
    validator: IngestionValidator,
    notifier: Arc<Notifier>,
    dispatcher: ChangeDispatcher,
    sweeper: ExpirySweeper,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let channel = Arc::new(CollectingChannel::default());
    let pipeline = PipelineConfig::default();

    let validator = IngestionValidator::from_config(store.clone(), channel.clone(), &pipeline);
    let notifier = Arc::new(Notifier::new(store.clone(), channel.clone()));
    let dispatcher = ChangeDispatcher::new(store.clone(), notifier.clone(), DispatcherConfig::default());
    let sweeper = ExpirySweeper::from_config(store.clone(), &SweeperConfig::default(), &pipeline);

    Harness {
        store,
        channel,
        validator,
        notifier,
        dispatcher,
        sweeper,
    }
}

async fn ingest(h: &Harness, key: &str, size: u64) -> IngestOutcome {
    let result = h
        .validator
        .process_batch(&[ObjectCreatedEvent::new(key, size)])
        .await;
    result.items.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_allowed_upload_is_stored_with_thirty_minute_ttl() {
    let h = harness();

    let IngestOutcome::Stored(record) = ingest(&h, "report.pdf", 1024).await else {
        panic!("report.pdf should be stored");
    };

    assert_eq!(record.ttl - record.upload_timestamp, Duration::minutes(30));
    let stored = h.store.get_by_file_key("report.pdf").await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.file_extension, "pdf");
    assert_eq!(stored.file_size, 1024);
    assert!(h.channel.published().is_empty());
}

#[tokio::test]
async fn test_disallowed_upload_is_rejected_and_not_stored() {
    let h = harness();

    let outcome = ingest(&h, "malware.exe", 4096).await;

    assert!(matches!(outcome, IngestOutcome::Rejected { .. }));
    assert!(h.store.get_by_file_key("malware.exe").await.unwrap().is_none());
    let published = h.channel.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].kind, NotificationKind::Rejected);
    assert!(published[0].message.contains("exe"));
    assert!(published[0].message.contains("malware.exe"));
}

#[tokio::test]
async fn test_expired_record_produces_one_removal_and_a_success_notice() {
    let h = harness();
    let IngestOutcome::Stored(record) = ingest(&h, "report.pdf", 1024).await else {
        panic!("report.pdf should be stored");
    };

    let report = h
        .sweeper
        .sweep_once(Utc::now() + Duration::minutes(31))
        .await
        .unwrap();
    assert_eq!(report.expired, 1);
    assert!(h.store.get_by_file_key("report.pdf").await.unwrap().is_none());

    let removals: Vec<_> = h
        .store
        .read_changes(0, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.kind == ChangeKind::Remove)
        .collect();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].cause, Some(RemovalCause::Expired));

    let poll = h.dispatcher.poll_once().await.unwrap();
    assert_eq!(poll.published, 1);

    let published = h.channel.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].kind, NotificationKind::Removed);
    assert!(published[0].message.contains("pdf"));
    assert!(published[0].message.contains("1024"));
    assert!(published[0]
        .message
        .contains(&record.upload_timestamp.to_rfc3339()));
}

#[tokio::test]
async fn test_sweep_before_ttl_removes_nothing() {
    let h = harness();
    ingest(&h, "photo.jpg", 10).await;

    let report = h.sweeper.sweep_once(Utc::now()).await.unwrap();

    assert_eq!(report.expired, 0);
    assert!(h.store.get_by_file_key("photo.jpg").await.unwrap().is_some());
}

#[tokio::test]
async fn test_explicit_delete_makes_lookup_miss() {
    let h = harness();
    let IngestOutcome::Stored(record) = ingest(&h, "photo.png", 77).await else {
        panic!("photo.png should be stored");
    };

    assert!(h.store.delete(record.id).await.unwrap());

    assert!(h.store.get_by_file_key("photo.png").await.unwrap().is_none());
    let poll = h.dispatcher.poll_once().await.unwrap();
    assert_eq!(poll.removals, 1);
    assert_eq!(poll.published, 1);
}

#[tokio::test]
async fn test_duplicate_removal_is_published_once() {
    let h = harness();
    let IngestOutcome::Stored(record) = ingest(&h, "report.pdf", 1024).await else {
        panic!("report.pdf should be stored");
    };
    h.store.delete(record.id).await.unwrap();

    let removal = h
        .store
        .read_changes(0, 100)
        .await
        .unwrap()
        .into_iter()
        .find_map(|c| c.into_removal())
        .unwrap();

    let first = h.notifier.notify(&removal).await;
    let second = h.notifier.notify(&removal).await;

    assert!(matches!(first, NotifyOutcome::Published { .. }));
    assert_eq!(
        second,
        NotifyOutcome::NoMetadata {
            file_key: "report.pdf".to_string()
        }
    );
    assert_eq!(h.channel.published().len(), 1);
}
