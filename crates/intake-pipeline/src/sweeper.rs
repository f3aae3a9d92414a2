//! Expiry sweeper
//!
//! Removes records whose `ttl` has elapsed and evicts removal history once it
//! is older than the retention window. Each removal produces the same change
//! entry an explicit delete would.

use chrono::{DateTime, Utc};
use intake_core::{PipelineConfig, SweeperConfig};
use intake_store::{MetadataStore, StoreResult};
use std::sync::Arc;

use crate::task::BackgroundTask;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

pub struct ExpirySweeper {
    store: Arc<dyn MetadataStore>,
    config: SweeperConfig,
    history_retention: chrono::Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        config: SweeperConfig,
        history_retention: chrono::Duration,
    ) -> Self {
        Self {
            store,
            config,
            history_retention,
        }
    }

    pub fn from_config(
        store: Arc<dyn MetadataStore>,
        sweeper: &SweeperConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self::new(store, sweeper.clone(), pipeline.history_retention())
    }

    /// Remove everything expired as of `now`, then purge old history.
    #[tracing::instrument(skip(self), fields(sweep.batch_size = self.config.batch_size))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let batch_size = self.config.batch_size.max(1);
        let mut expired = 0;
        loop {
            let removed = self.store.remove_expired(now, batch_size).await?;
            expired += removed;
            if removed < batch_size {
                break;
            }
        }

        let purged = self
            .store
            .purge_history(now - self.history_retention)
            .await?;

        if expired > 0 || purged > 0 {
            tracing::info!(expired, purged, "Expiry sweep completed");
        } else {
            tracing::debug!("Expiry sweep found nothing to remove");
        }

        Ok(SweepReport { expired, purged })
    }

    pub fn spawn(self: Arc<Self>) -> BackgroundTask {
        let period = self.config.interval;
        BackgroundTask::spawn_periodic("expiry-sweeper", period, move || {
            let sweeper = self.clone();
            async move {
                if let Err(e) = sweeper.sweep_once(Utc::now()).await {
                    tracing::error!(error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}
