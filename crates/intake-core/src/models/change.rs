use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::record::FileMetadataRecord;

/// Kind of mutation recorded in the store's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

impl FromStr for ChangeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "MODIFY" => Ok(ChangeKind::Modify),
            "REMOVE" => Ok(ChangeKind::Remove),
            _ => Err(anyhow::anyhow!("Invalid change kind: {}", s)),
        }
    }
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Modify => write!(f, "MODIFY"),
            ChangeKind::Remove => write!(f, "REMOVE"),
        }
    }
}

/// Why a record left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalCause {
    /// A client called `delete`.
    Explicit,
    /// The expiry sweep removed it after `ttl` elapsed.
    Expired,
}

impl FromStr for RemovalCause {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explicit" => Ok(RemovalCause::Explicit),
            "expired" => Ok(RemovalCause::Expired),
            _ => Err(anyhow::anyhow!("Invalid removal cause: {}", s)),
        }
    }
}

impl Display for RemovalCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RemovalCause::Explicit => write!(f, "explicit"),
            RemovalCause::Expired => write!(f, "expired"),
        }
    }
}

/// One entry of the ordered change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub sequence: u64,
    pub kind: ChangeKind,
    pub record_id: Uuid,
    pub previous_image: Option<FileMetadataRecord>,
    pub current_image: Option<FileMetadataRecord>,
    pub cause: Option<RemovalCause>,
    pub recorded_at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn is_removal(&self) -> bool {
        self.kind == ChangeKind::Remove
    }

    /// Converts a `REMOVE` change into the event consumed by the notifier.
    /// Any other kind, or a removal without a previous image, yields `None`.
    pub fn into_removal(self) -> Option<RemovalEvent> {
        if self.kind != ChangeKind::Remove {
            return None;
        }
        let previous_image = self.previous_image?;
        Some(RemovalEvent {
            sequence: self.sequence,
            previous_image,
            cause: self.cause.unwrap_or(RemovalCause::Explicit),
        })
    }
}

/// A record-removed change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalEvent {
    pub sequence: u64,
    pub previous_image: FileMetadataRecord,
    pub cause: RemovalCause,
}

impl RemovalEvent {
    pub fn file_key(&self) -> &str {
        &self.previous_image.file_key
    }

    pub fn record_id(&self) -> Uuid {
        self.previous_image.id
    }
}
