//! Tracevault Core - OTLP payload handling for the partial-trace lifecycle
//!
//! This crate provides the payload-level building blocks shared by the
//! ingest and collection sides of tracevault:
//!
//! - **Event**: decoding heartbeat/stop control attributes from log records
//! - **Codec**: protobuf/JSON encoding and decoding of trace envelopes
//! - **Flatten**: exploding multi-span envelopes into single-span ones
//! - **Merge**: overlaying carrier attributes onto embedded spans
//! - **Trace**: single-span envelope accessors and id rendering

pub mod codec;
pub mod error;
pub mod event;
pub mod flatten;
pub mod merge;
pub mod trace;

// Re-export commonly used types
pub use codec::{BodyFormat, TraceCodec};
pub use error::{CoreError, CoreResult};
pub use event::{attrs, decode_body_format, decode_event, PartialEvent};
pub use flatten::{flatten, span_count};
pub use merge::{bool_value, merge_attributes, upsert_attribute};
pub use trace::{
    first_resource_mut, first_span, first_span_mut, set_end_timestamp, SpanKey,
};
