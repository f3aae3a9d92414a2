use async_trait::async_trait;

use super::{Subscriber, TopicMessage};

/// Writes every notification to the tracing log.
///
/// Attached when no external subscriber is configured so that notices are
/// never silently dropped.
pub struct LogSubscriber;

#[async_trait]
impl Subscriber for LogSubscriber {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &TopicMessage) -> anyhow::Result<()> {
        tracing::info!(
            topic = %message.topic,
            message_id = %message.message_id,
            kind = %message.kind,
            subject = %message.subject,
            "{}",
            message.message
        );
        Ok(())
    }
}
