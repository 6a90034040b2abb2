//! Partial-event decoding
//!
//! Heartbeat and stop records are ordinary OTLP log records distinguished
//! by `partial.*` control attributes. The decoder turns those attributes
//! into a closed [`PartialEvent`] so nothing past this boundary compares
//! strings.

use std::time::Duration;

use opentelemetry_proto::tonic::common::v1::{any_value, KeyValue};

use crate::codec::BodyFormat;
use crate::error::{CoreError, CoreResult};

/// Control attributes carried by heartbeat/stop log records.
pub mod attrs {
    /// Event discriminator: `"heartbeat"` or `"stop"` (required)
    pub const EVENT: &str = "partial.event";
    /// Expected interval until the next heartbeat, as a duration string
    /// (required for heartbeat)
    pub const FREQUENCY: &str = "partial.frequency";
    /// Body serialization: `"proto"` (default) or `"json"`
    pub const BODY_TYPE: &str = "partial.body.type";
    /// Mark stamped on spans finalized by the collector
    pub const GC: &str = "partial.gc";
    /// Reserved prefix; keys under it are control metadata and never reach
    /// persisted spans
    pub const PREFIX: &str = "partial.";
}

/// A decoded partial-trace lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialEvent {
    /// The span is still in flight; refresh its row. Carries the interval
    /// the emitter promises until the next heartbeat.
    Heartbeat { interval: Duration },

    /// The span finished normally; withdraw its row.
    Stop,
}

/// Look up a string attribute by key.
pub fn find_str<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| match kv.value.as_ref()?.value.as_ref()? {
            any_value::Value::StringValue(text) => Some(text.as_str()),
            _ => None,
        })
}

/// Decode the event tag, and for heartbeats the interval, from log record
/// attributes. Stop records do not read `partial.frequency`.
pub fn decode_event(attributes: &[KeyValue]) -> CoreResult<PartialEvent> {
    let event = find_str(attributes, attrs::EVENT).ok_or(CoreError::MissingEvent)?;
    match event {
        "heartbeat" => {
            let frequency =
                find_str(attributes, attrs::FREQUENCY).ok_or(CoreError::MissingFrequency)?;
            let interval =
                humantime::parse_duration(frequency).map_err(|source| {
                    CoreError::InvalidFrequency {
                        value: frequency.to_string(),
                        source,
                    }
                })?;
            Ok(PartialEvent::Heartbeat { interval })
        }
        "stop" => Ok(PartialEvent::Stop),
        other => Err(CoreError::UnknownEvent(other.to_string())),
    }
}

/// Decode the body format, defaulting to protobuf when the attribute is
/// absent.
pub fn decode_body_format(attributes: &[KeyValue]) -> CoreResult<BodyFormat> {
    match find_str(attributes, attrs::BODY_TYPE) {
        None => Ok(BodyFormat::Proto),
        Some("proto") => Ok(BodyFormat::Proto),
        Some("json") => Ok(BodyFormat::Json),
        Some(other) => Err(CoreError::UnknownBodyFormat(other.to_string())),
    }
}
