//! Notification channel that records what it is asked to publish

use async_trait::async_trait;
use intake_core::{Notification, NotificationChannel, PublishError, PublishReceipt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct RecordingChannel {
    published: Mutex<Vec<Notification>>,
    attempts: AtomicUsize,
    /// Number of upcoming publishes that fail; `usize::MAX` fails forever.
    failures_left: AtomicUsize,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        })
    }

    /// A channel whose every publish fails.
    pub fn failing() -> Arc<Self> {
        let channel = Self::new();
        channel.fail_next(usize::MAX);
        channel
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Successfully published notifications, in publish order.
    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().unwrap().clone()
    }

    /// Publish calls including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, notification: &Notification) -> Result<PublishReceipt, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(PublishError::Unavailable("recording channel set to fail".to_string()));
        }

        self.published.lock().unwrap().push(notification.clone());
        Ok(PublishReceipt {
            message_id: Uuid::new_v4(),
            delivered: 1,
            failed: 0,
        })
    }
}
