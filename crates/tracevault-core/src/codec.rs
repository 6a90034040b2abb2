//! Trace envelope codecs
//!
//! Heartbeat and stop records carry the in-progress span as a serialized
//! OTLP trace envelope in the log record body. The codec turns bodies into
//! [`TracesData`] and back into the protobuf bytes the store persists.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use prost::Message as _;

use crate::error::{CoreError, CoreResult};

/// Wire format of a heartbeat/stop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// OTLP protobuf, base64-encoded when carried as a string body (default)
    #[default]
    Proto,
    /// OTLP JSON
    Json,
}

/// Stateless encoder/decoder for OTLP trace envelopes.
///
/// Constructed per component; holds no buffers or connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceCodec;

impl TraceCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode a log record body into a trace envelope.
    ///
    /// For `proto`, a bytes body is decoded directly and a string body is
    /// base64-decoded first, falling back to the string's raw bytes for
    /// payloads produced by emitters that never base64-encoded. For `json`,
    /// the string body is OTLP JSON.
    pub fn decode_body(&self, record: &LogRecord, format: BodyFormat) -> CoreResult<TracesData> {
        let value = record
            .body
            .as_ref()
            .and_then(|body| body.value.as_ref())
            .ok_or(CoreError::MissingBody)?;

        match (format, value) {
            (BodyFormat::Proto, any_value::Value::BytesValue(bytes)) => self.decode_proto(bytes),
            (BodyFormat::Proto, any_value::Value::StringValue(text)) => match BASE64.decode(text) {
                Ok(raw) => self.decode_proto(&raw),
                Err(_) => self.decode_proto(text.as_bytes()),
            },
            (BodyFormat::Json, any_value::Value::StringValue(text)) => {
                self.decode_json(text.as_bytes())
            }
            (format, _) => Err(CoreError::UnsupportedBody { format }),
        }
    }

    /// Decode an OTLP protobuf trace envelope.
    pub fn decode_proto(&self, bytes: &[u8]) -> CoreResult<TracesData> {
        Ok(TracesData::decode(bytes)?)
    }

    /// Decode an OTLP JSON trace envelope.
    pub fn decode_json(&self, bytes: &[u8]) -> CoreResult<TracesData> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize a trace envelope to the protobuf bytes the store persists.
    pub fn encode_proto(&self, traces: &TracesData) -> Vec<u8> {
        traces.encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::AnyValue;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};

    fn single_span_traces() -> TracesData {
        TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![Span {
                        trace_id: vec![0xaa; 16],
                        span_id: vec![0xbb; 8],
                        name: "work".to_string(),
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    fn record_with_body(value: any_value::Value) -> LogRecord {
        LogRecord {
            body: Some(AnyValue { value: Some(value) }),
            ..Default::default()
        }
    }

    #[test]
    fn test_proto_roundtrip() {
        let codec = TraceCodec::new();
        let traces = single_span_traces();
        let bytes = codec.encode_proto(&traces);
        let decoded = codec.decode_proto(&bytes).unwrap();
        assert_eq!(traces, decoded);
    }

    #[test]
    fn test_decode_body_base64_string() {
        let codec = TraceCodec::new();
        let traces = single_span_traces();
        let encoded = BASE64.encode(codec.encode_proto(&traces));
        let record = record_with_body(any_value::Value::StringValue(encoded));
        let decoded = codec.decode_body(&record, BodyFormat::Proto).unwrap();
        assert_eq!(traces, decoded);
    }

    #[test]
    fn test_decode_body_raw_bytes() {
        let codec = TraceCodec::new();
        let traces = single_span_traces();
        let bytes = codec.encode_proto(&traces);
        let record = record_with_body(any_value::Value::BytesValue(bytes));
        let decoded = codec.decode_body(&record, BodyFormat::Proto).unwrap();
        assert_eq!(traces, decoded);
    }

    #[test]
    fn test_decode_body_json() {
        let codec = TraceCodec::new();
        let traces = single_span_traces();
        let json = serde_json::to_string(&traces).unwrap();
        let record = record_with_body(any_value::Value::StringValue(json));
        let decoded = codec.decode_body(&record, BodyFormat::Json).unwrap();
        assert_eq!(traces, decoded);
    }

    #[test]
    fn test_decode_body_missing() {
        let codec = TraceCodec::new();
        let record = LogRecord::default();
        let err = codec.decode_body(&record, BodyFormat::Proto).unwrap_err();
        assert!(matches!(err, CoreError::MissingBody));
    }

    #[test]
    fn test_decode_body_wrong_value_type() {
        let codec = TraceCodec::new();
        let record = record_with_body(any_value::Value::IntValue(7));
        let err = codec.decode_body(&record, BodyFormat::Json).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedBody {
                format: BodyFormat::Json
            }
        ));
    }

    #[test]
    fn test_decode_body_garbage_is_fatal() {
        let codec = TraceCodec::new();
        let record = record_with_body(any_value::Value::BytesValue(vec![0xff, 0xfe, 0x01]));
        let err = codec.decode_body(&record, BodyFormat::Proto).unwrap_err();
        assert!(err.is_fatal());
    }
}
