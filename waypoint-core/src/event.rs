//! Events as written to and read from the log.
//!
//! [`NewEvent`] is what a writer hands to [`EventStore::append_events`];
//! [`RecordedEvent`] is what readers get back, stamped with its stream-local
//! `position`, its log-wide `global_position` and the time it was recorded.
//!
//! [`EventStore::append_events`]: crate::store::EventStore::append_events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::stream::StreamName;

/// Event data ready to be appended to a stream.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub id: Uuid,
    pub kind: String,
    pub data: serde_json::Value,
}

impl NewEvent {
    /// Create an event with a fresh random id.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            data,
        }
    }

    /// Create an event from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload cannot be serialized.
    pub fn from_payload<T: Serialize>(
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }
}

/// An event materialized from the log.
///
/// The serialized form is the wire encoding used for callers outside the
/// engine: `position` and `global_position` are decimal strings, `time` is an
/// RFC 3339 timestamp and the event type is carried in the `type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub stream_name: StreamName,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    /// Position within the stream.
    #[serde(with = "crate::wire::decimal")]
    pub position: u64,
    /// Position within the whole log.
    #[serde(with = "crate::wire::decimal")]
    pub global_position: u64,
    pub time: DateTime<Utc>,
}

impl RecordedEvent {
    /// Decode the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
