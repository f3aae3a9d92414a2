//! SQS event source
//!
//! Long-polls a queue fed by S3 event notifications. Retryable events are
//! re-sent to the same queue as a redelivery envelope with `DelaySeconds`, and
//! the original message is deleted once its outcome is settled.

use anyhow::Context;
use async_trait::async_trait;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use intake_core::SqsConfig;
use std::time::Duration;

use crate::s3_event::{decode_message_body, encode_envelope};
use crate::source::{Delivery, EventSource, Redelivery};

/// Upper bound SQS accepts for `DelaySeconds`.
const MAX_DELAY_SECONDS: u64 = 900;

#[derive(Clone)]
pub struct SqsEventSource {
    client: Client,
    queue_url: String,
    wait_time_seconds: i32,
    max_messages: i32,
}

impl SqsEventSource {
    pub fn new(client: Client, queue_url: impl Into<String>, wait_time_seconds: i32, max_messages: i32) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            wait_time_seconds: wait_time_seconds.clamp(0, 20),
            max_messages: max_messages.clamp(1, 10),
        }
    }

    /// Build a client from the default AWS credential chain.
    pub async fn from_config(config: &SqsConfig) -> Self {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).retry_config(retry_config);
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        tracing::info!(queue_url = %config.queue_url, "SQS event source configured");
        Self::new(
            Client::new(&sdk_config),
            config.queue_url.clone(),
            config.wait_time_seconds,
            config.max_messages,
        )
    }

    async fn delete(&self, receipt_handle: &str) -> anyhow::Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .context("Failed to delete SQS message")?;
        Ok(())
    }
}

fn delay_seconds(delay: Duration) -> i32 {
    delay.as_secs().min(MAX_DELAY_SECONDS) as i32
}

#[async_trait]
impl EventSource for SqsEventSource {
    async fn receive(&self) -> anyhow::Result<Vec<Delivery>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .context("Failed to receive SQS messages")?;

        let mut deliveries = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let Some(receipt) = message.receipt_handle().map(str::to_string) else {
                continue;
            };
            let body = message.body().unwrap_or_default();

            match decode_message_body(body) {
                Ok(batch) if batch.is_empty() => {
                    tracing::debug!(message_id = ?message.message_id(), "Message carries no object-created events");
                    self.delete(&receipt).await?;
                }
                Ok(batch) => deliveries.push(Delivery {
                    batch,
                    receipt: Some(receipt),
                }),
                Err(e) => {
                    tracing::error!(
                        message_id = ?message.message_id(),
                        error = %e,
                        "Dropping undecodable queue message"
                    );
                    self.delete(&receipt).await?;
                }
            }
        }
        Ok(deliveries)
    }

    async fn complete(&self, delivery: Delivery, redelivery: Option<Redelivery>) -> anyhow::Result<()> {
        if let Some(redelivery) = redelivery {
            let delay = delay_seconds(redelivery.delay);
            let body = encode_envelope(&redelivery.into_batch())?;
            self.client
                .send_message()
                .queue_url(&self.queue_url)
                .message_body(body)
                .delay_seconds(delay)
                .send()
                .await
                .context("Failed to send redelivery envelope")?;
        }

        if let Some(receipt) = delivery.receipt.as_deref() {
            self.delete(receipt).await?;
        }
        Ok(())
    }
}
