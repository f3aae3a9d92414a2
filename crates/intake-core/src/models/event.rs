use serde::{Deserialize, Serialize};

/// An "object created" fact delivered by the storage event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatedEvent {
    pub object_key: String,
    pub object_size: u64,
}

impl ObjectCreatedEvent {
    pub fn new(object_key: impl Into<String>, object_size: u64) -> Self {
        Self {
            object_key: object_key.into(),
            object_size,
        }
    }
}

/// A batch of object-created events as handed to the ingestion validator.
///
/// `attempt` starts at 1 for a first delivery and is bumped on every redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreatedBatch {
    pub events: Vec<ObjectCreatedEvent>,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl ObjectCreatedBatch {
    pub fn new(events: Vec<ObjectCreatedEvent>) -> Self {
        Self { events, attempt: 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
