//! Attribute-map merging
//!
//! When a heartbeat is persisted, the carrier log record's resource
//! attributes are overlaid onto the embedded span's resource. The overlay
//! never overwrites and never copies control metadata.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};

use crate::event::attrs;

/// Overlay `sources` onto `dst` in order.
///
/// Keys under the reserved `partial.` prefix are skipped. Keys already
/// present in `dst` are skipped, so the destination wins and, between
/// sources sharing a key, the earlier source wins. Values keep their type:
/// bool, int, double, string, bytes, map, list, and empty all carry over.
pub fn merge_attributes(dst: &mut Vec<KeyValue>, sources: &[&[KeyValue]]) {
    for source in sources {
        for kv in *source {
            if kv.key.starts_with(attrs::PREFIX) {
                continue;
            }
            if dst.iter().any(|existing| existing.key == kv.key) {
                continue;
            }
            dst.push(kv.clone());
        }
    }
}

/// Insert an attribute, replacing any existing value under the same key.
pub fn upsert_attribute(dst: &mut Vec<KeyValue>, key: &str, value: AnyValue) {
    match dst.iter_mut().find(|kv| kv.key == key) {
        Some(existing) => existing.value = Some(value),
        None => dst.push(KeyValue {
            key: key.to_string(),
            value: Some(value),
        }),
    }
}

/// A boolean attribute value.
pub fn bool_value(value: bool) -> AnyValue {
    AnyValue {
        value: Some(any_value::Value::BoolValue(value)),
    }
}
