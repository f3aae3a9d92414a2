//! Intake Store Library
//!
//! Persistence for file metadata records together with the ordered change log
//! the notifier consumes. Two backends implement the same contracts:
//!
//! - **memory**: process-local maps behind a `tokio::sync::RwLock`
//! - **postgres**: records, change log and consumer checkpoints in three tables
//!
//! Removed records keep their last image in the change log until the history
//! retention window passes; `claim_removed` hands that image out at most once.

pub mod factory;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_store, StoreHandles};
pub use intake_core::StoreBackend;
pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use traits::{ChangeFeed, MetadataStore, StoreError, StoreResult};
