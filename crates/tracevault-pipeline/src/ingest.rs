//! Log-record ingestion
//!
//! The ingestor interprets inbound log records as heartbeat/stop events:
//! heartbeats upsert an expiry-tagged row per `(trace_id, span_id)`, stops
//! delete it. Within a batch, records apply in source order; across
//! batches the last writer wins per key. Parallel `consume` calls contend
//! only at the store, there is no in-process locking.

use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use tracing::{debug, warn};
use tracevault_core::{
    decode_body_format, decode_event, first_resource_mut, first_span, flatten, merge_attributes,
    PartialEvent, SpanKey, TraceCodec,
};
use tracevault_store::{PartialTrace, Store};

use crate::error::{ErrorList, IngestError};

/// Applies partial-trace lifecycle events from log records to the store.
pub struct Ingestor {
    store: Store,
    codec: TraceCodec,
    expiry_factor: u32,
}

impl Ingestor {
    /// `expiry_factor` multiplies the heartbeat interval to derive each
    /// row's expiry; callers validate it is at least 1.
    pub fn new(store: Store, expiry_factor: u32) -> Self {
        Self {
            store,
            codec: TraceCodec::new(),
            expiry_factor,
        }
    }

    /// Apply a batch of log records in source order.
    ///
    /// Records without usable control attributes are skipped with a
    /// warning. A payload that cannot be deserialized fails the whole
    /// batch. Other per-span failures accumulate and come back joined, so
    /// one bad span does not block the rest of the batch.
    pub async fn consume(&self, logs: LogsData) -> Result<(), IngestError> {
        let now = Utc::now();
        let mut errors = Vec::new();

        for resource_log in logs.resource_logs {
            let resource_attrs = resource_log
                .resource
                .map(|resource| resource.attributes)
                .unwrap_or_default();

            for scope_log in resource_log.scope_logs {
                for record in scope_log.log_records {
                    let event = match decode_event(&record.attributes) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(error = %err, "skipping log record");
                            continue;
                        }
                    };
                    let format = match decode_body_format(&record.attributes) {
                        Ok(format) => format,
                        Err(err) => {
                            warn!(error = %err, "skipping log record");
                            continue;
                        }
                    };

                    let traces = self
                        .codec
                        .decode_body(&record, format)
                        .map_err(IngestError::Payload)?;

                    for mut trace in flatten(traces) {
                        let result = match event {
                            PartialEvent::Heartbeat { interval } => {
                                self.apply_heartbeat(&mut trace, &resource_attrs, interval, now)
                                    .await
                            }
                            PartialEvent::Stop => self.apply_stop(&trace).await,
                        };
                        if let Err(err) = result {
                            errors.push(err);
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IngestError::Batch(ErrorList(errors)))
        }
    }

    async fn apply_heartbeat(
        &self,
        trace: &mut TracesData,
        resource_attrs: &[KeyValue],
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        if let Some(resource) = first_resource_mut(trace) {
            merge_attributes(&mut resource.attributes, &[resource_attrs]);
        }

        let Some(span) = first_span(trace) else {
            return Err(IngestError::EmptyTrace);
        };
        let key = SpanKey::of(span);
        let payload = self.codec.encode_proto(trace);
        let expires_at = expires_at(now, interval, self.expiry_factor)?;

        debug!(key = %key, ?interval, "heartbeat");
        self.store
            .put(&PartialTrace {
                trace_id: key.trace_id,
                span_id: key.span_id,
                trace: payload,
                received_at: now,
                expires_at,
            })
            .await?;
        Ok(())
    }

    async fn apply_stop(&self, trace: &TracesData) -> Result<(), IngestError> {
        let Some(span) = first_span(trace) else {
            return Err(IngestError::EmptyTrace);
        };
        let key = SpanKey::of(span);

        debug!(key = %key, "stop");
        self.store.delete(&key.trace_id, &key.span_id).await?;
        Ok(())
    }
}

/// `now + interval * factor`, the instant the row becomes eligible for
/// collection.
fn expires_at(
    now: DateTime<Utc>,
    interval: Duration,
    factor: u32,
) -> Result<DateTime<Utc>, IngestError> {
    let overflow = || IngestError::ExpiryOverflow { interval, factor };
    let window =
        chrono::Duration::from_std(interval.saturating_mul(factor)).map_err(|_| overflow())?;
    now.checked_add_signed(window).ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The store-facing paths live in tests/pipeline.rs against a live
    // database; only the expiry arithmetic is testable here.

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let at = expires_at(now, Duration::from_secs(10), 3).unwrap();
        assert_eq!(at, now + chrono::Duration::seconds(30));
    }

    #[test]
    fn test_zero_interval_expires_immediately() {
        let now = Utc::now();
        let at = expires_at(now, Duration::ZERO, 3).unwrap();
        assert_eq!(at, now);
    }

    #[test]
    fn test_absurd_interval_overflows() {
        let now = Utc::now();
        let err = expires_at(now, Duration::from_secs(u64::MAX), u32::MAX).unwrap_err();
        assert!(matches!(err, IngestError::ExpiryOverflow { .. }));
    }
}
