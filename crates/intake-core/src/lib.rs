//! Intake Core Library
//!
//! Domain models, error taxonomy, configuration, extension validation and the
//! notification-channel contract shared by every intake component.

pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod store_types;
pub mod validation;

// Re-export commonly used types
pub use channel::{NotificationChannel, PublishError, PublishReceipt};
pub use config::{
    DispatcherConfig, EmailConfig, IntakeConfig, LogFormat, PipelineConfig, SqsConfig,
    StoreConfig, SweeperConfig, WebhookConfig, WorkerConfig,
};
pub use error::{LogLevel, PipelineError};
pub use models::{
    ChangeKind, ChangeRecord, FileMetadataRecord, Notification, NotificationKind,
    ObjectCreatedBatch, ObjectCreatedEvent, RemovalCause, RemovalEvent,
};
pub use retry::RetryPolicy;
pub use store_types::StoreBackend;
pub use validation::{extract_extension, ExtensionAllowList};
