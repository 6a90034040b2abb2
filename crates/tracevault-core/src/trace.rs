//! Single-span envelope helpers
//!
//! After flattening, every envelope holds exactly one resource-spans entry
//! with one scope and one span. These accessors encode that shape once so
//! callers do not chain `first()` everywhere the Go-style `At(0)` walks
//! would go.

use std::fmt;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{Span, TracesData};

/// Hex-rendered `(trace_id, span_id)` primary key of a persisted span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanKey {
    /// 32-char lowercase hex trace id
    pub trace_id: String,
    /// 16-char lowercase hex span id
    pub span_id: String,
}

impl SpanKey {
    /// Key of a span.
    pub fn of(span: &Span) -> Self {
        Self {
            trace_id: hex::encode(&span.trace_id),
            span_id: hex::encode(&span.span_id),
        }
    }
}

impl fmt::Display for SpanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace {} span {}", self.trace_id, self.span_id)
    }
}

/// The single span of a flattened envelope.
pub fn first_span(traces: &TracesData) -> Option<&Span> {
    traces
        .resource_spans
        .first()?
        .scope_spans
        .first()?
        .spans
        .first()
}

/// Mutable access to the single span of a flattened envelope.
pub fn first_span_mut(traces: &mut TracesData) -> Option<&mut Span> {
    traces
        .resource_spans
        .first_mut()?
        .scope_spans
        .first_mut()?
        .spans
        .first_mut()
}

/// The resource of the first resource-spans entry, created when absent.
pub fn first_resource_mut(traces: &mut TracesData) -> Option<&mut Resource> {
    let resource_span = traces.resource_spans.first_mut()?;
    Some(resource_span.resource.get_or_insert_with(Resource::default))
}

/// Stamp the span end at `at`, in unix nanoseconds.
pub fn set_end_timestamp(span: &mut Span, at: DateTime<Utc>) {
    span.end_time_unix_nano = at.timestamp_nanos_opt().unwrap_or(0) as u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans};

    fn single_span_traces() -> TracesData {
        TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![Span {
                        trace_id: vec![0xaa; 16],
                        span_id: vec![0xbb; 8],
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn test_span_key_hex_forms() {
        let traces = single_span_traces();
        let key = SpanKey::of(first_span(&traces).unwrap());
        assert_eq!(key.trace_id, "aa".repeat(16));
        assert_eq!(key.span_id, "bb".repeat(8));
        assert_eq!(key.trace_id.len(), 32);
        assert_eq!(key.span_id.len(), 16);
    }

    #[test]
    fn test_first_span_empty_envelope() {
        assert!(first_span(&TracesData::default()).is_none());
        assert!(first_span_mut(&mut TracesData::default()).is_none());
        assert!(first_resource_mut(&mut TracesData::default()).is_none());
    }

    #[test]
    fn test_first_resource_created_when_absent() {
        let mut traces = single_span_traces();
        assert!(traces.resource_spans[0].resource.is_none());
        let resource = first_resource_mut(&mut traces).unwrap();
        assert!(resource.attributes.is_empty());
        assert!(traces.resource_spans[0].resource.is_some());
    }

    #[test]
    fn test_set_end_timestamp() {
        let mut traces = single_span_traces();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let span = first_span_mut(&mut traces).unwrap();
        set_end_timestamp(span, at);
        assert_eq!(
            span.end_time_unix_nano,
            at.timestamp_nanos_opt().unwrap() as u64
        );
    }
}
