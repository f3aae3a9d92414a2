//! Ingestion worker
//!
//! Pulls deliveries from an [`EventSource`], runs each batch through the
//! validator under the invocation budget, and tells the source what to
//! redeliver. A timed-out batch comes back whole; otherwise only events with
//! retryable failures do.

use futures::future::join_all;
use intake_core::{ObjectCreatedEvent, PipelineError, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::IngestionValidator;
use crate::outcome::log_failure;
use crate::source::{Delivery, EventSource, Redelivery};
use crate::task::BackgroundTask;

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub events: usize,
    pub timed_out: bool,
    pub redelivered: usize,
    pub dropped: usize,
}

pub struct IngestionWorker {
    source: Arc<dyn EventSource>,
    validator: Arc<IngestionValidator>,
    config: WorkerConfig,
}

impl IngestionWorker {
    pub fn new(source: Arc<dyn EventSource>, validator: Arc<IngestionValidator>, config: WorkerConfig) -> Self {
        Self {
            source,
            validator,
            config,
        }
    }

    #[tracing::instrument(skip(self, delivery), fields(attempt = delivery.batch.attempt, events = delivery.batch.events.len()))]
    pub async fn handle(&self, delivery: Delivery) -> anyhow::Result<DeliveryReport> {
        let attempt = delivery.batch.attempt;
        let events = &delivery.batch.events;
        let mut report = DeliveryReport {
            events: events.len(),
            ..DeliveryReport::default()
        };

        let budget = self.config.invocation_timeout;
        let retry: Vec<ObjectCreatedEvent> =
            match tokio::time::timeout(budget, self.validator.process_batch(events)).await {
                Ok(result) => result
                    .retryable_indices()
                    .into_iter()
                    .map(|i| events[i].clone())
                    .collect(),
                Err(_) => {
                    report.timed_out = true;
                    let error = PipelineError::Timeout {
                        budget_ms: budget.as_millis() as u64,
                    };
                    log_failure("batch", &error, "Ingestion batch exceeded its time budget");
                    events.clone()
                }
            };

        let redelivery = if retry.is_empty() {
            None
        } else if self.config.retry.can_retry(attempt) {
            report.redelivered = retry.len();
            let delay = self.config.retry.backoff(attempt);
            tracing::warn!(
                events = retry.len(),
                next_attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Scheduling redelivery of failed events"
            );
            Some(Redelivery {
                events: retry,
                attempt: attempt + 1,
                delay,
            })
        } else {
            report.dropped = retry.len();
            for event in &retry {
                tracing::error!(
                    object_key = %event.object_key,
                    attempts = attempt,
                    "Dropping event after exhausting retry attempts"
                );
            }
            None
        };

        self.source.complete(delivery, redelivery).await?;
        Ok(report)
    }

    /// Receive once and handle every delivery concurrently.
    pub async fn run_once(&self) -> anyhow::Result<Vec<DeliveryReport>> {
        let deliveries = self.source.receive().await?;
        let results = join_all(deliveries.into_iter().map(|d| self.handle(d))).await;
        results.into_iter().collect()
    }

    pub fn spawn(self: Arc<Self>) -> BackgroundTask {
        BackgroundTask::spawn("ingestion-worker", move |mut shutdown_rx| async move {
            tracing::info!("Ingestion worker started");
            loop {
                let received = tokio::select! {
                    received = self.source.receive() => received,
                    _ = shutdown_rx.recv() => break,
                };

                match received {
                    Ok(deliveries) => {
                        for delivery in deliveries {
                            if let Err(e) = self.handle(delivery).await {
                                tracing::error!(error = %e, "Failed to complete delivery");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to receive events");
                        tokio::select! {
                            _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                            _ = shutdown_rx.recv() => break,
                        }
                    }
                }
            }
            tracing::info!("Ingestion worker shutting down");
        })
    }
}
