//! Error types module
//!
//! `PipelineError` is the per-item failure taxonomy shared by the ingestion
//! validator, the notifier and the workers that redeliver their input. Every
//! variant self-describes whether it may be retried and how loudly it should
//! be logged.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like rejected extensions
    Debug,
    /// Warning level - for transient failures that will be redelivered
    Warn,
    /// Error level - for failures that need an operator
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid file type: {extension} for file: {object_key}")]
    ValidationRejected {
        object_key: String,
        extension: String,
    },

    #[error("Failed to store metadata for {object_key}: {reason}")]
    StoreWriteFailure { object_key: String, reason: String },

    #[error("Failed to look up metadata for {file_key}: {reason}")]
    StoreLookupFailure { file_key: String, reason: String },

    #[error("No metadata found for file key: {file_key}")]
    StoreLookupMiss { file_key: String },

    #[error("Failed to publish notification: {0}")]
    PublishFailure(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Invocation exceeded its budget of {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Static metadata for each variant: (error_code, recoverable, log_level).
fn pipeline_error_static_metadata(err: &PipelineError) -> (&'static str, bool, LogLevel) {
    match err {
        PipelineError::ValidationRejected { .. } => ("VALIDATION_REJECTED", false, LogLevel::Debug),
        PipelineError::StoreWriteFailure { .. } => ("STORE_WRITE_FAILURE", true, LogLevel::Warn),
        PipelineError::StoreLookupFailure { .. } => ("STORE_LOOKUP_FAILURE", true, LogLevel::Warn),
        PipelineError::StoreLookupMiss { .. } => ("STORE_LOOKUP_MISS", false, LogLevel::Debug),
        PipelineError::PublishFailure(_) => ("PUBLISH_FAILURE", true, LogLevel::Warn),
        PipelineError::IntegrityViolation(_) => ("INTEGRITY_VIOLATION", false, LogLevel::Error),
        PipelineError::Timeout { .. } => ("TIMEOUT", true, LogLevel::Warn),
        PipelineError::Configuration(_) => ("CONFIGURATION_ERROR", false, LogLevel::Error),
    }
}

impl PipelineError {
    /// Machine-readable error code (e.g. "STORE_WRITE_FAILURE")
    pub fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).0
    }

    /// Whether redelivering the originating event may succeed
    pub fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).1
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_write_failure_is_transient() {
        let err = PipelineError::StoreWriteFailure {
            object_key: "report.pdf".to_string(),
            reason: "connection reset".to_string(),
        };
        assert_eq!(err.error_code(), "STORE_WRITE_FAILURE");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);
        assert!(err.to_string().contains("report.pdf"));
    }

    #[test]
    fn test_integrity_violation_is_loud_and_final() {
        let err = PipelineError::IntegrityViolation("duplicate id".to_string());
        assert_eq!(err.error_code(), "INTEGRITY_VIOLATION");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_expected_outcomes_log_at_debug() {
        let rejected = PipelineError::ValidationRejected {
            object_key: "malware.exe".to_string(),
            extension: "exe".to_string(),
        };
        let miss = PipelineError::StoreLookupMiss {
            file_key: "gone.pdf".to_string(),
        };

        assert_eq!(rejected.log_level(), LogLevel::Debug);
        assert_eq!(miss.log_level(), LogLevel::Debug);
        assert!(!rejected.is_recoverable());
        assert!(!miss.is_recoverable());
        assert_eq!(
            rejected.to_string(),
            "Invalid file type: exe for file: malware.exe"
        );
    }

    #[test]
    fn test_publish_failure_and_timeout_are_retryable() {
        assert!(PipelineError::PublishFailure("topic unavailable".to_string()).is_recoverable());
        assert!(PipelineError::Timeout { budget_ms: 30_000 }.is_recoverable());
    }
}
