//! Error types
//!
//! Only operations a caller asked for surface errors. Malformed records from a
//! producer, channel overflow and termination timeouts are recovered locally.

use std::io;

/// Result alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Error type for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The external command has no program to run
    #[error("external command is empty")]
    EmptyCommand,

    /// The external process could not be spawned
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A spawned process came back without the stdout pipe we asked for
    #[error("spawned process has no {0} pipe")]
    MissingPipe(&'static str),

    /// A manually injected record was rejected
    #[error("invalid telemetry record: {0}")]
    Record(#[from] RecordError),
}

/// Why a single line could not be turned into a sample
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Blank line
    #[error("empty record")]
    Empty,

    /// Not valid JSON
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// Object that does not match the reading shape (strict decoding only)
    #[error("record does not match the reading shape: {0}")]
    Shape(String),
}

impl RecordError {
    /// Short label for logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Empty => "empty",
            RecordError::Json(_) => "json",
            RecordError::NotAnObject => "not_object",
            RecordError::Shape(_) => "shape",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let err = HubError::Spawn {
            program: "robotd".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };

        let msg = err.to_string();
        assert!(msg.contains("robotd"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_record_error_converts() {
        let err: HubError = RecordError::NotAnObject.into();
        assert!(matches!(err, HubError::Record(RecordError::NotAnObject)));
    }

    #[test]
    fn test_record_error_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(RecordError::Json(json_err).kind(), "json");
        assert_eq!(RecordError::Empty.kind(), "empty");
        assert_eq!(RecordError::Shape("t".into()).kind(), "shape");
    }
}
