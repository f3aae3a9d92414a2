//! Test helpers for pipeline tests
//!
//! In-process doubles for the notification channel and the metadata store.
//! No database or network access is needed.

pub mod failing_store;
pub mod recording_channel;

pub use failing_store::{FailingStore, StoreFailure};
pub use recording_channel::RecordingChannel;
