//! Downstream trace consumer seam

use async_trait::async_trait;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use thiserror::Error;
use tracing::info;
use tracevault_core::{first_span, SpanKey};

/// Error returned by a downstream consumer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConsumerError(pub String);

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Destination for finalized traces.
///
/// Implementations must tolerate duplicates: a trace whose delivery
/// succeeded but whose row deletion or commit failed is redelivered on a
/// later collector pass.
#[async_trait]
pub trait TraceConsumer: Send + Sync {
    async fn consume(&self, trace: TracesData) -> Result<(), ConsumerError>;
}

/// Consumer that only logs; stands in when no downstream is configured.
#[derive(Debug, Default)]
pub struct LoggingConsumer;

#[async_trait]
impl TraceConsumer for LoggingConsumer {
    async fn consume(&self, trace: TracesData) -> Result<(), ConsumerError> {
        match first_span(&trace) {
            Some(span) => info!(key = %SpanKey::of(span), "finalized trace, no downstream configured"),
            None => info!("finalized trace without span, no downstream configured"),
        }
        Ok(())
    }
}
