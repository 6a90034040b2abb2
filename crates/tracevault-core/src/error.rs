//! Error types for tracevault-core

use thiserror::Error;

use crate::codec::BodyFormat;

/// Errors from decoding partial-trace payloads and control attributes.
///
/// Control-attribute variants (`MissingEvent`, `UnknownEvent`,
/// `MissingFrequency`, `InvalidFrequency`, `UnknownBodyFormat`) are
/// record-level: callers log them and skip the record. Payload variants
/// (`ProtoDecode`, `JsonDecode`) abort the enclosing batch.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The record carries no `partial.event` attribute
    #[error("missing partial.event attribute")]
    MissingEvent,

    /// `partial.event` is neither `heartbeat` nor `stop`
    #[error("unknown partial.event value {0:?}")]
    UnknownEvent(String),

    /// A heartbeat record carries no `partial.frequency` attribute
    #[error("heartbeat record has no partial.frequency attribute")]
    MissingFrequency,

    /// `partial.frequency` is not a valid duration string
    #[error("invalid partial.frequency value {value:?}: {source}")]
    InvalidFrequency {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    /// `partial.body.type` is neither `proto` nor `json`
    #[error("unknown partial.body.type value {0:?}")]
    UnknownBodyFormat(String),

    /// The record has no body to decode
    #[error("log record has no body")]
    MissingBody,

    /// The body value type does not fit the declared format
    #[error("unsupported body value for {format:?} payload")]
    UnsupportedBody { format: BodyFormat },

    /// Protobuf payload decoding failed
    #[error("failed to decode trace protobuf: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// JSON payload decoding failed
    #[error("failed to decode trace JSON: {0}")]
    JsonDecode(#[from] serde_json::Error),
}

/// Result type for payload operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error aborts the batch rather than skipping one record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::ProtoDecode(_) | CoreError::JsonDecode(_) | CoreError::MissingBody
                | CoreError::UnsupportedBody { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!CoreError::MissingEvent.is_fatal());
        assert!(!CoreError::UnknownEvent("pause".to_string()).is_fatal());
        assert!(!CoreError::MissingFrequency.is_fatal());
        assert!(CoreError::MissingBody.is_fatal());
        assert!(CoreError::UnsupportedBody {
            format: BodyFormat::Proto
        }
        .is_fatal());
    }
}
