//! Timeout-driven finalization of expired partial traces
//!
//! The collector periodically scans for rows whose expiry has passed,
//! synthesizes a completion for each (end timestamp plus the `partial.gc`
//! mark), forwards it downstream, and deletes the row, all inside one
//! serializable transaction per pass. Row locks from the scan keep
//! concurrent collectors off the same rows until commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng as _;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracevault_core::{
    attrs, bool_value, first_span_mut, set_end_timestamp, upsert_attribute, SpanKey, TraceCodec,
};
use tracevault_store::{partial_trace, ExpiredTrace, PgConnection, Store, TxOptions};

use crate::consumer::TraceConsumer;
use crate::error::{GcError, RowError, RowErrorList, RowFailure};

/// Half-width of the jitter applied to every tick wait.
const TICK_JITTER: Duration = Duration::from_millis(500);

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Base interval between collection passes
    pub gc_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            gc_interval: Duration::from_secs(5),
        }
    }
}

/// Promotes expired heartbeat rows into finalized downstream traces.
pub struct Collector {
    store: Store,
    consumer: Arc<dyn TraceConsumer>,
    codec: TraceCodec,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(store: Store, consumer: Arc<dyn TraceConsumer>, config: CollectorConfig) -> Self {
        Self {
            store,
            consumer,
            codec: TraceCodec::new(),
            config,
        }
    }

    /// Run one collection pass inside a single serializable transaction.
    ///
    /// Returns the number of rows finalized. Per-row failures leave their
    /// row in place for a later pass and come back joined; delivery is
    /// therefore at-least-once overall, exactly-once when both the
    /// consumer and the commit succeed.
    pub async fn run_once(&self) -> Result<usize, GcError> {
        let now = Utc::now();
        let consumer = Arc::clone(&self.consumer);
        let codec = self.codec;

        let (collected, failures) = self
            .store
            .transact(TxOptions::serializable(), move |conn| {
                let consumer = Arc::clone(&consumer);
                Box::pin(async move {
                    let rows = partial_trace::list_expired(&mut *conn, now).await?;
                    let mut collected = 0usize;
                    let mut failures = Vec::new();

                    for row in rows {
                        match finalize_row(&mut *conn, &consumer, codec, &row, now).await {
                            Ok(()) => collected += 1,
                            Err(kind) => failures.push(RowFailure {
                                key: SpanKey {
                                    trace_id: row.trace_id.clone(),
                                    span_id: row.span_id.clone(),
                                },
                                kind,
                            }),
                        }
                    }

                    Ok((collected, failures))
                })
            })
            .await?;

        if !failures.is_empty() {
            return Err(GcError::Rows(RowErrorList(failures)));
        }
        if collected > 0 {
            debug!(collected, "collection pass complete");
        }
        Ok(collected)
    }

    /// Spawn the collection loop on its own task.
    ///
    /// The first pass runs after the first wait, not at startup. The task
    /// is cancelled through the returned handle; cancellation lets an
    /// in-flight pass finish before the loop exits.
    pub fn spawn(self: Arc<Self>) -> CollectorHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let collector = self;

        let handle = tokio::spawn(async move {
            info!(interval = ?collector.config.gc_interval, "collector started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(next_wait(collector.config.gc_interval)) => {
                        if let Err(err) = collector.run_once().await {
                            error!(error = %err, "collection pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("collector stopped");
        });

        CollectorHandle {
            shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// `base` plus per-tick jitter uniform in [-500 ms, +500 ms).
fn next_wait(base: Duration) -> Duration {
    let jitter_bound = TICK_JITTER.as_millis() as i64;
    let jitter_ms = rand::thread_rng().gen_range(-jitter_bound..jitter_bound);
    let wait_ms = base.as_millis() as i64 + jitter_ms;
    Duration::from_millis(wait_ms.max(0) as u64)
}

/// Rehydrate one locked row, synthesize its completion, hand it
/// downstream, and delete it. The row survives any failure here.
async fn finalize_row(
    conn: &mut PgConnection,
    consumer: &Arc<dyn TraceConsumer>,
    codec: TraceCodec,
    row: &ExpiredTrace,
    now: DateTime<Utc>,
) -> Result<(), RowError> {
    let trace = synthesize_completion(codec, &row.trace, now)?;

    consumer.consume(trace).await.map_err(RowError::Consumer)?;

    partial_trace::delete(&mut *conn, &row.trace_id, &row.span_id)
        .await
        .map_err(RowError::Delete)?;
    Ok(())
}

/// Decode a stored payload and stamp the synthetic completion: the span
/// ends at `now` and carries `partial.gc = true`.
fn synthesize_completion(
    codec: TraceCodec,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<opentelemetry_proto::tonic::trace::v1::TracesData, RowError> {
    let mut trace = codec.decode_proto(payload).map_err(RowError::Decode)?;
    let Some(span) = first_span_mut(&mut trace) else {
        return Err(RowError::EmptyTrace);
    };
    set_end_timestamp(span, now);
    upsert_attribute(&mut span.attributes, attrs::GC, bool_value(true));
    Ok(trace)
}

/// Handle to a running collector task.
pub struct CollectorHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Signal the loop to stop and wait for it to exit; the in-flight
    /// pass, if any, finishes first. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    // Loop panics are fatal to the process
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, TracesData};
    use tracevault_core::first_span;

    fn single_span_payload(codec: TraceCodec) -> Vec<u8> {
        let traces = TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![Span {
                        trace_id: vec![0xaa; 16],
                        span_id: vec![0xbb; 8],
                        name: "work".to_string(),
                        start_time_unix_nano: 1,
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };
        codec.encode_proto(&traces)
    }

    #[test]
    fn test_synthesize_completion_marks_span() {
        let codec = TraceCodec::new();
        let payload = single_span_payload(codec);
        let now = Utc::now();

        let trace = synthesize_completion(codec, &payload, now).unwrap();
        let span = first_span(&trace).unwrap();

        assert_eq!(
            span.end_time_unix_nano,
            now.timestamp_nanos_opt().unwrap() as u64
        );
        let gc = span
            .attributes
            .iter()
            .find(|kv| kv.key == attrs::GC)
            .expect("partial.gc attribute");
        use opentelemetry_proto::tonic::common::v1::any_value::Value;
        assert_eq!(
            gc.value.as_ref().unwrap().value,
            Some(Value::BoolValue(true))
        );
        // Everything else about the span is untouched
        assert_eq!(span.name, "work");
        assert_eq!(span.start_time_unix_nano, 1);
    }

    #[test]
    fn test_synthesize_completion_rejects_garbage() {
        let codec = TraceCodec::new();
        let err = synthesize_completion(codec, &[0xff, 0x00], Utc::now()).unwrap_err();
        assert!(matches!(err, RowError::Decode(_)));
    }

    #[test]
    fn test_synthesize_completion_rejects_empty_envelope() {
        let codec = TraceCodec::new();
        let payload = codec.encode_proto(&TracesData::default());
        let err = synthesize_completion(codec, &payload, Utc::now()).unwrap_err();
        assert!(matches!(err, RowError::EmptyTrace));
    }

    #[test]
    fn test_next_wait_stays_within_jitter_band() {
        let base = Duration::from_secs(5);
        let lower = base - TICK_JITTER;
        let upper = base + TICK_JITTER;
        for _ in 0..100 {
            let wait = next_wait(base);
            assert!(wait >= lower && wait < upper);
        }
    }

    #[test]
    fn test_next_wait_never_goes_negative() {
        for _ in 0..100 {
            // Base shorter than the jitter band clamps at zero
            let _ = next_wait(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_default_config() {
        assert_eq!(CollectorConfig::default().gc_interval, Duration::from_secs(5));
    }
}
