//! Event sources feeding the ingestion worker
//!
//! A source hands out deliveries of object-created batches and is told, once
//! a delivery is processed, which of its events (if any) must come back.

use async_trait::async_trait;
use intake_core::{ObjectCreatedBatch, ObjectCreatedEvent};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One unit of work taken from a source.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub batch: ObjectCreatedBatch,
    /// Source-specific handle used to acknowledge the delivery.
    pub receipt: Option<String>,
}

/// Events to hand back to the source after a delay.
#[derive(Debug, Clone, PartialEq)]
pub struct Redelivery {
    pub events: Vec<ObjectCreatedEvent>,
    pub attempt: u32,
    pub delay: Duration,
}

impl Redelivery {
    pub fn into_batch(self) -> ObjectCreatedBatch {
        ObjectCreatedBatch {
            events: self.events,
            attempt: self.attempt,
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next deliveries. May return an empty list when a poll
    /// window elapses with nothing to do.
    async fn receive(&self) -> anyhow::Result<Vec<Delivery>>;

    /// Acknowledge a delivery, scheduling `redelivery` if given.
    async fn complete(&self, delivery: Delivery, redelivery: Option<Redelivery>) -> anyhow::Result<()>;
}

/// In-process source backed by a bounded tokio channel.
pub struct ChannelEventSource {
    tx: mpsc::Sender<ObjectCreatedBatch>,
    rx: Mutex<mpsc::Receiver<ObjectCreatedBatch>>,
    max_batches: usize,
}

impl ChannelEventSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            max_batches: 10,
        }
    }

    /// Handle for producers.
    pub fn sender(&self) -> mpsc::Sender<ObjectCreatedBatch> {
        self.tx.clone()
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn receive(&self) -> anyhow::Result<Vec<Delivery>> {
        let mut rx = self.rx.lock().await;
        let Some(first) = rx.recv().await else {
            return Err(anyhow::anyhow!("event channel closed"));
        };

        let mut deliveries = vec![Delivery {
            batch: first,
            receipt: None,
        }];
        while deliveries.len() < self.max_batches {
            match rx.try_recv() {
                Ok(batch) => deliveries.push(Delivery {
                    batch,
                    receipt: None,
                }),
                Err(_) => break,
            }
        }
        Ok(deliveries)
    }

    async fn complete(&self, _delivery: Delivery, redelivery: Option<Redelivery>) -> anyhow::Result<()> {
        let Some(redelivery) = redelivery else {
            return Ok(());
        };

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(redelivery.delay).await;
            let attempt = redelivery.attempt;
            if tx.send(redelivery.into_batch()).await.is_err() {
                tracing::warn!(attempt = attempt, "Event channel closed before redelivery");
            }
        });
        Ok(())
    }
}
