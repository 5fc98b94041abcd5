//! Storage notification decoding.
//!
//! A batch arrives either as queue messages whose `body` is itself a JSON
//! storage notification, or as storage notification records delivered
//! directly. Both levels are decoded strictly: a malformed inner body fails
//! the whole batch.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Malformed notification input.
#[derive(Debug, Error)]
pub enum EventError {
    /// The batch is not JSON of either accepted shape.
    #[error("invalid notification envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// A queue message body is not a storage notification.
    #[error("invalid notification in message {index}: {source}")]
    Body {
        /// Position of the message in the batch.
        index: usize,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },

    /// A queue message body is itself a queue message batch.
    #[error("message {0} wraps another queue message")]
    Nested(usize),

    /// An object key does not decode.
    #[error("object key {0:?} is not valid percent-encoded UTF-8")]
    Key(String),
}

/// One object that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    /// Bucket holding the object.
    pub bucket: String,
    /// Decoded object key.
    pub key: String,
}

impl ObjectEvent {
    /// Event for `key` in `bucket`; the key is taken as already decoded.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Record {
    Storage { s3: StorageEntity },
    Queue { body: String },
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Debug, Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    key: String,
}

/// Keys in storage notifications are form-encoded: `+` is a space.
fn decode_key(raw: &str) -> Result<String, EventError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| EventError::Key(raw.to_string()))
}

impl StorageEntity {
    fn into_event(self) -> Result<ObjectEvent, EventError> {
        Ok(ObjectEvent {
            key: decode_key(&self.object.key)?,
            bucket: self.bucket.name,
        })
    }
}

/// Decode a batch into object events, in delivery order.
///
/// # Errors
///
/// Any malformed envelope, inner body or key fails the whole batch.
pub fn decode_batch(input: &[u8]) -> Result<Vec<ObjectEvent>, EventError> {
    let outer: Notification = serde_json::from_slice(input).map_err(EventError::Envelope)?;
    let mut events = Vec::new();
    for (index, record) in outer.records.into_iter().enumerate() {
        match record {
            Record::Storage { s3 } => events.push(s3.into_event()?),
            Record::Queue { body } => {
                let inner: Notification = serde_json::from_str(&body)
                    .map_err(|source| EventError::Body { index, source })?;
                for record in inner.records {
                    match record {
                        Record::Storage { s3 } => events.push(s3.into_event()?),
                        Record::Queue { .. } => return Err(EventError::Nested(index)),
                    }
                }
            }
        }
    }
    tracing::debug!(events = events.len(), "decoded notification batch");
    Ok(events)
}

/// Group events by bucket, keeping delivery order within each bucket.
pub fn group_by_bucket(events: Vec<ObjectEvent>) -> BTreeMap<String, Vec<ObjectEvent>> {
    let mut groups: BTreeMap<String, Vec<ObjectEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.bucket.clone()).or_default().push(event);
    }
    groups
}
