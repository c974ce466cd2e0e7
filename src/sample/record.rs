//! Line-oriented record decoding
//!
//! External producers write one JSON record per line. Decoding never fails
//! loudly: every outcome is a tagged result the caller can count and drop.

use serde_json::{Map, Value};

use crate::error::RecordError;

use super::{Reading, Sample};

/// How to treat objects that do not match the reading shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordPolicy {
    /// Forward any JSON object; shape-matching ones become readings
    #[default]
    Permissive,
    /// Only accept readings with the expected arity
    Strict,
}

/// Decodes lines into samples
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    arity: usize,
    policy: RecordPolicy,
}

impl RecordDecoder {
    /// Create a decoder expecting `arity` channels per reading
    pub fn new(arity: usize, policy: RecordPolicy) -> Self {
        Self { arity, policy }
    }

    /// Decoder that only accepts well-shaped readings
    pub fn strict(arity: usize) -> Self {
        Self::new(arity, RecordPolicy::Strict)
    }

    /// Expected channel count
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Decoding policy
    pub fn policy(&self) -> RecordPolicy {
        self.policy
    }

    /// Decode raw bytes from a process pipe
    ///
    /// Invalid UTF-8 is replaced rather than rejected, so a stray byte does not
    /// cost a whole record.
    pub fn decode_bytes(&self, raw: &[u8]) -> Result<Sample, RecordError> {
        self.decode(&String::from_utf8_lossy(raw))
    }

    /// Decode one line
    pub fn decode(&self, line: &str) -> Result<Sample, RecordError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RecordError::Empty);
        }

        let fields = match serde_json::from_str::<Value>(line)? {
            Value::Object(fields) => fields,
            _ => return Err(RecordError::NotAnObject),
        };

        match self.match_reading(&fields) {
            Ok(reading) => Ok(Sample::Reading(reading)),
            Err(reason) => match self.policy {
                RecordPolicy::Permissive => Ok(Sample::record(fields)),
                RecordPolicy::Strict => Err(RecordError::Shape(reason)),
            },
        }
    }

    fn match_reading(&self, fields: &Map<String, Value>) -> Result<Reading, String> {
        let timestamp = fields
            .get("t")
            .and_then(Value::as_f64)
            .ok_or_else(|| "missing numeric `t`".to_string())?;

        let motors = fields
            .get("motors")
            .and_then(Value::as_array)
            .ok_or_else(|| "missing `motors` array".to_string())?;

        if motors.len() != self.arity {
            return Err(format!(
                "expected {} channels, found {}",
                self.arity,
                motors.len()
            ));
        }

        let channels = motors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64()
                    .ok_or_else(|| format!("channel {} is not a number", i))
            })
            .collect::<Result<Vec<f64>, String>>()?;

        Ok(Reading::new(timestamp, channels))
    }
}
