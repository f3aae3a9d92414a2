//! Data models for the intake pipeline
//!
//! Records, inbound events, change-log entries and outbound notifications.

mod change;
mod event;
mod notification;
mod record;

pub use change::{ChangeKind, ChangeRecord, RemovalCause, RemovalEvent};
pub use event::{ObjectCreatedBatch, ObjectCreatedEvent};
pub use notification::{Notification, NotificationKind};
pub use record::FileMetadataRecord;
