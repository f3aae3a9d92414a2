//! Notification topic
//!
//! A `Topic` is a named channel that fans each notification out to every
//! registered subscriber. Deliveries run concurrently and each one is retried
//! on its own; the publish fails only when no subscriber received it.

mod logging;
#[cfg(feature = "webhook")]
mod webhook;
#[cfg(feature = "email")]
mod email;

pub use logging::LogSubscriber;
#[cfg(feature = "webhook")]
pub use webhook::{sign_payload, WebhookSubscriber};
#[cfg(feature = "email")]
pub use email::EmailSubscriber;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use intake_core::{
    Notification, NotificationChannel, NotificationKind, PublishError, PublishReceipt,
    RetryPolicy,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// A notification as handed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessage {
    pub topic: String,
    pub message_id: Uuid,
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
    pub published_at: DateTime<Utc>,
}

/// A delivery endpoint attached to a topic.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &TopicMessage) -> anyhow::Result<()>;
}

pub struct Topic {
    name: String,
    subscribers: Vec<Arc<dyn Subscriber>>,
    retry: RetryPolicy,
}

impl Topic {
    pub fn new(name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            subscribers: Vec::new(),
            retry,
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    async fn deliver_with_retry(
        &self,
        subscriber: &dyn Subscriber,
        message: &TopicMessage,
    ) -> anyhow::Result<()> {
        let mut attempt = 1;
        loop {
            match subscriber.deliver(message).await {
                Ok(()) => return Ok(()),
                Err(e) if self.retry.can_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        topic = %self.name,
                        subscriber = %subscriber.name(),
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for Topic {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, notification), fields(topic = %self.name, kind = %notification.kind))]
    async fn publish(&self, notification: &Notification) -> Result<PublishReceipt, PublishError> {
        let message = TopicMessage {
            topic: self.name.clone(),
            message_id: Uuid::new_v4(),
            kind: notification.kind,
            subject: notification.subject.clone(),
            message: notification.message.clone(),
            published_at: Utc::now(),
        };

        if self.subscribers.is_empty() {
            tracing::debug!(message_id = %message.message_id, "Topic has no subscribers");
            return Ok(PublishReceipt {
                message_id: message.message_id,
                delivered: 0,
                failed: 0,
            });
        }

        let results = join_all(
            self.subscribers
                .iter()
                .map(|s| self.deliver_with_retry(s.as_ref(), &message)),
        )
        .await;

        let mut delivered = 0;
        let mut last_error = None;
        for (subscriber, result) in self.subscribers.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber = %subscriber.name(),
                        message_id = %message.message_id,
                        error = %e,
                        "Subscriber delivery failed"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }
        let failed = self.subscribers.len() - delivered;

        if delivered == 0 {
            return Err(PublishError::Undelivered {
                subscribers: failed,
                reason: last_error.unwrap_or_default(),
            });
        }

        if failed > 0 {
            tracing::warn!(
                message_id = %message.message_id,
                delivered = delivered,
                failed = failed,
                "Notification partially delivered"
            );
        }

        Ok(PublishReceipt {
            message_id: message.message_id,
            delivered,
            failed,
        })
    }
}
