use crate::memory::InMemoryStore;
#[cfg(feature = "postgres")]
use crate::postgres::PostgresStore;
use crate::traits::{ChangeFeed, MetadataStore, StoreResult};
#[cfg(not(feature = "postgres"))]
use crate::traits::StoreError;
use crate::StoreBackend;
use intake_core::StoreConfig;
use std::sync::Arc;

/// Both views over one backend instance.
#[derive(Clone)]
pub struct StoreHandles {
    pub metadata: Arc<dyn MetadataStore>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl StoreHandles {
    /// Share one concrete store as both the record store and the change feed.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: MetadataStore + ChangeFeed + 'static,
    {
        Self {
            metadata: store.clone(),
            changes: store,
        }
    }
}

/// Create a metadata store based on configuration
pub async fn create_store(config: &StoreConfig) -> StoreResult<StoreHandles> {
    match config.backend {
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(config).await?;
            Ok(StoreHandles::from_shared(Arc::new(store)))
        }

        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => Err(StoreError::ConfigError(
            "Postgres store backend not available (postgres feature not enabled)".to_string(),
        )),

        StoreBackend::Memory => {
            tracing::warn!("Using in-memory metadata store; records are lost on restart");
            Ok(StoreHandles::from_shared(Arc::new(InMemoryStore::new())))
        }
    }
}
