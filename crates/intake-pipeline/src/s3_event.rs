//! Queue message decoding
//!
//! Queue bodies are either S3 event notifications, S3's test event, or the
//! pipeline's own redelivery envelope (`{"events": [...], "attempt": n}`).

use intake_core::{ObjectCreatedBatch, ObjectCreatedEvent};
use serde::Deserialize;

const TEST_EVENT: &str = "s3:TestEvent";
const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Deserialize)]
struct S3EventNotification {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3EventRecord {
    #[serde(default)]
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
    #[serde(default)]
    size: u64,
}

/// S3 URL-encodes object keys in notifications and writes spaces as `+`.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::warn!(key = %raw, error = %e, "Object key is not valid UTF-8 after decoding");
            spaced
        }
    }
}

/// Decode a queue message body into a batch. Messages that carry no
/// object-created records decode to an empty batch.
pub fn decode_message_body(body: &str) -> Result<ObjectCreatedBatch, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    if value.get("events").is_some() {
        return serde_json::from_value(value);
    }

    if value.get("Event").and_then(|e| e.as_str()) == Some(TEST_EVENT) {
        return Ok(ObjectCreatedBatch::new(Vec::new()));
    }

    let notification: S3EventNotification = serde_json::from_value(value)?;
    let events = notification
        .records
        .into_iter()
        .filter(|r| r.event_name.starts_with(OBJECT_CREATED_PREFIX))
        .map(|r| ObjectCreatedEvent::new(decode_object_key(&r.s3.object.key), r.s3.object.size))
        .collect();

    Ok(ObjectCreatedBatch::new(events))
}

/// Encode a batch as a redelivery envelope.
pub fn encode_envelope(batch: &ObjectCreatedBatch) -> Result<String, serde_json::Error> {
    serde_json::to_string(batch)
}
