//! Background task handles

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A spawned loop that stops when `shutdown` is called.
pub struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `run`, handing it the receiver it must watch for shutdown.
    pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(shutdown_rx));
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    /// Run `tick` every `period` until shutdown. A tick in progress finishes
    /// before the loop exits.
    pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(name, move |mut shutdown_rx| async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(task = name, period_ms = period.as_millis() as u64, "Background task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = name, "Background task shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) {
        if let Err(e) = self.shutdown_tx.send(()).await {
            tracing::warn!(task = self.name, error = %e, "Failed to send shutdown signal");
        }
        if let Err(e) = self.handle.await {
            tracing::error!(task = self.name, error = %e, "Background task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = BackgroundTask::spawn_periodic("counter", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        task.shutdown().await;

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected at least two ticks, saw {}", seen);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
