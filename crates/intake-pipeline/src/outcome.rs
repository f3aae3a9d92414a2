//! Per-item results
//!
//! Every batch operation returns one outcome per input item, in input order,
//! so the caller can decide redelivery item by item.

use intake_core::{FileMetadataRecord, LogLevel, PipelineError};

/// Access to the failure carried by an item outcome, if any.
pub trait ItemOutcome {
    fn error(&self) -> Option<&PipelineError>;

    fn is_retryable(&self) -> bool {
        self.error().is_some_and(PipelineError::is_recoverable)
    }
}

/// Result of ingesting one object-created event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored(FileMetadataRecord),
    Rejected { object_key: String, extension: String },
    Failed { object_key: String, error: PipelineError },
}

impl ItemOutcome for IngestOutcome {
    fn error(&self) -> Option<&PipelineError> {
        match self {
            IngestOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result of notifying one removal.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    Published { file_key: String },
    NoMetadata { file_key: String },
    Failed { file_key: String, error: PipelineError },
}

impl ItemOutcome for NotifyOutcome {
    fn error(&self) -> Option<&PipelineError> {
        match self {
            NotifyOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub items: Vec<T>,
}

impl<T: ItemOutcome> BatchResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|i| i.error().is_some()).count()
    }

    /// Input positions whose failure may succeed on redelivery.
    pub fn retryable_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_retryable())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn has_retryable(&self) -> bool {
        self.items.iter().any(ItemOutcome::is_retryable)
    }
}

/// Emit a failure at the level its error kind asks for.
pub(crate) fn log_failure(key: &str, error: &PipelineError, message: &str) {
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            key = %key,
            error_code = error.error_code(),
            error = %error,
            "{}", message
        ),
        LogLevel::Warn => tracing::warn!(
            key = %key,
            error_code = error.error_code(),
            error = %error,
            "{}", message
        ),
        LogLevel::Error => tracing::error!(
            key = %key,
            error_code = error.error_code(),
            error = %error,
            "{}", message
        ),
    }
}
