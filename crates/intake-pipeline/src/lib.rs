//! Intake Pipeline Library
//!
//! The three flows of the file intake service:
//!
//! - **ingest**: object-created events are validated by extension and either
//!   stored as metadata records or rejected with a notification
//! - **sweeper**: expired records are removed in bounded batches
//! - **dispatcher** and **notifier**: removals read from the change log are
//!   turned into success notifications, at most once per removal
//!
//! Events reach the ingestion worker through an [`EventSource`]; the SQS
//! source is behind the `sqs` feature.

pub mod dispatcher;
pub mod ingest;
pub mod notifier;
pub mod outcome;
pub mod s3_event;
pub mod source;
#[cfg(feature = "sqs")]
pub mod sqs;
pub mod sweeper;
pub mod task;
pub mod worker;

// Test helpers (only available in test mode)
#[cfg(test)]
pub mod test_helpers;

// Re-export commonly used types
pub use dispatcher::{ChangeDispatcher, PollReport};
pub use ingest::IngestionValidator;
pub use notifier::Notifier;
pub use outcome::{BatchResult, IngestOutcome, ItemOutcome, NotifyOutcome};
pub use s3_event::decode_message_body;
pub use source::{ChannelEventSource, Delivery, EventSource, Redelivery};
#[cfg(feature = "sqs")]
pub use sqs::SqsEventSource;
pub use sweeper::{ExpirySweeper, SweepReport};
pub use task::BackgroundTask;
pub use worker::{DeliveryReport, IngestionWorker};
