//! Flattening of multi-span OTLP envelopes
//!
//! The store keys rows by `(trace_id, span_id)`, so every persisted payload
//! holds exactly one span. A heartbeat may carry several spans at once;
//! flattening explodes such an envelope into one single-span envelope per
//! span while keeping each span's resource, scope, and schema URLs around
//! it.

use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, TracesData};

/// Total span count across the resource/scope tree.
pub fn span_count(traces: &TracesData) -> usize {
    traces
        .resource_spans
        .iter()
        .flat_map(|resource_span| resource_span.scope_spans.iter())
        .map(|scope_span| scope_span.spans.len())
        .sum()
}

/// Explode a trace envelope into one single-span envelope per span.
///
/// A payload already holding exactly one span passes through unmodified.
pub fn flatten(traces: TracesData) -> Vec<TracesData> {
    if span_count(&traces) == 1 {
        return vec![traces];
    }

    let mut out = Vec::with_capacity(span_count(&traces));
    for resource_span in traces.resource_spans {
        let ResourceSpans {
            resource,
            scope_spans,
            schema_url: resource_schema_url,
        } = resource_span;

        for scope_span in scope_spans {
            let ScopeSpans {
                scope,
                spans,
                schema_url: scope_schema_url,
            } = scope_span;

            for span in spans {
                out.push(TracesData {
                    resource_spans: vec![ResourceSpans {
                        resource: resource.clone(),
                        scope_spans: vec![ScopeSpans {
                            scope: scope.clone(),
                            spans: vec![span],
                            schema_url: scope_schema_url.clone(),
                        }],
                        schema_url: resource_schema_url.clone(),
                    }],
                });
            }
        }
    }

    out
}
