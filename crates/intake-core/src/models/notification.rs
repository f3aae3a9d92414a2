use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::record::FileMetadataRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// An ingested object failed the extension allow-list.
    Rejected,
    /// A stored record was removed (explicitly or by expiry).
    Removed,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            NotificationKind::Rejected => write!(f, "rejected"),
            NotificationKind::Removed => write!(f, "removed"),
        }
    }
}

/// Human-readable message published to the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
}

impl Notification {
    pub fn rejected(object_key: &str, extension: &str) -> Self {
        Self {
            kind: NotificationKind::Rejected,
            subject: format!("Rejected upload: {}", object_key),
            message: format!("Invalid file type: {} for file: {}", extension, object_key),
        }
    }

    pub fn removed(record: &FileMetadataRecord) -> Self {
        Self {
            kind: NotificationKind::Removed,
            subject: format!("File metadata processed: {}", record.file_key),
            message: format!(
                "Success: metadata for {} was stored. File extension: {}, file size: {} bytes, uploaded at: {}",
                record.file_key,
                record.file_extension,
                record.file_size,
                record.upload_timestamp.to_rfc3339()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_rejection_names_extension_and_key() {
        let notification = Notification::rejected("malware.exe", "exe");
        assert_eq!(notification.kind, NotificationKind::Rejected);
        assert_eq!(
            notification.message,
            "Invalid file type: exe for file: malware.exe"
        );
    }

    #[test]
    fn test_removed_message_carries_record_fields() {
        let record =
            FileMetadataRecord::new("report.pdf", "pdf", 1024, Utc::now(), Duration::minutes(30))
                .unwrap();
        let notification = Notification::removed(&record);

        assert_eq!(notification.kind, NotificationKind::Removed);
        assert!(notification.message.starts_with("Success:"));
        assert!(notification.message.contains("pdf"));
        assert!(notification.message.contains("1024"));
        assert!(notification
            .message
            .contains(&record.upload_timestamp.to_rfc3339()));
    }
}
