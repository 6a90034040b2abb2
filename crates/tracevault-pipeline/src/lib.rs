//! Tracevault Pipeline - the partial-trace lifecycle engine
//!
//! The two-sided pipeline around the store:
//!
//! - **Ingestor**: interprets inbound log records as heartbeat/stop events
//!   and upserts or deletes expiry-tagged rows
//! - **Collector**: periodically promotes expired rows into finalized
//!   traces and forwards them downstream
//! - **Consumer**: the seam behind which the downstream trace sink lives
//! - **Service**: start/stop wiring and graceful drain

pub mod consumer;
pub mod error;
pub mod gc;
pub mod ingest;
pub mod service;

// Re-export commonly used types
pub use consumer::{ConsumerError, LoggingConsumer, TraceConsumer};
pub use error::{ErrorList, GcError, IngestError, RowError, RowErrorList, RowFailure};
pub use gc::{Collector, CollectorConfig, CollectorHandle};
pub use ingest::Ingestor;
pub use service::Service;
