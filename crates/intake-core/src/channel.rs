//! Notification channel contract
//!
//! The pipeline publishes human-readable notices to a fan-out channel. The
//! concrete channel (topic with webhook/email subscribers) lives in
//! `intake-infra`; components receive it as `Arc<dyn NotificationChannel>`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Notification;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Notification was not delivered to any of {subscribers} subscribers: {reason}")]
    Undelivered { subscribers: usize, reason: String },

    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Result of a publish accepted by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: Uuid,
    pub delivered: usize,
    pub failed: usize,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel identifier (topic name).
    fn name(&self) -> &str;

    async fn publish(&self, notification: &Notification) -> Result<PublishReceipt, PublishError>;
}
