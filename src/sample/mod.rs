//! Telemetry sample types
//!
//! A [`Sample`] is what flows through the hub. It is designed to be cheap to
//! clone: the channel vector of a [`Reading`] and the body of an opaque record
//! are reference counted, so fan-out to many subscribers never copies them.

pub mod record;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use record::{RecordDecoder, RecordPolicy};

/// One timestamped reading of every telemetry channel
///
/// On the wire this is `{"t": <seconds>, "motors": [<value>, ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "t")]
    timestamp: f64,
    #[serde(rename = "motors")]
    channels: Arc<[f64]>,
}

impl Reading {
    /// Create a reading
    pub fn new(timestamp: f64, channels: impl Into<Arc<[f64]>>) -> Self {
        Self {
            timestamp,
            channels: channels.into(),
        }
    }

    /// Timestamp in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Channel values, in channel index order
    pub fn channels(&self) -> &[f64] {
        &self.channels
    }

    /// Number of channels
    pub fn arity(&self) -> usize {
        self.channels.len()
    }
}

/// A telemetry sample broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// A reading with the expected channel arity
    Reading(Reading),
    /// Any other JSON object, forwarded untouched
    Record(Arc<Map<String, Value>>),
}

impl Sample {
    /// Create a reading sample
    pub fn reading(timestamp: f64, channels: impl Into<Arc<[f64]>>) -> Self {
        Sample::Reading(Reading::new(timestamp, channels))
    }

    /// Wrap an opaque structured record
    pub fn record(fields: Map<String, Value>) -> Self {
        Sample::Record(Arc::new(fields))
    }

    /// Get the reading, if this sample is one
    pub fn as_reading(&self) -> Option<&Reading> {
        match self {
            Sample::Reading(reading) => Some(reading),
            Sample::Record(_) => None,
        }
    }

    /// Timestamp of the sample, when it carries a numeric `t`
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Sample::Reading(reading) => Some(reading.timestamp),
            Sample::Record(fields) => fields.get("t").and_then(Value::as_f64),
        }
    }

    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_json(&self) -> String {
        // Maps with string keys and finite-or-null numbers always serialize
        serde_json::to_string(self).unwrap_or_else(|_| String::from("null"))
    }
}

impl From<Reading> for Sample {
    fn from(reading: Reading) -> Self {
        Sample::Reading(reading)
    }
}
