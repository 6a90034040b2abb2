//! OTLP/gRPC forwarding of finalized traces

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use tonic::transport::Channel;
use tracing::debug;
use tracevault_pipeline::{ConsumerError, TraceConsumer};

/// Forwards finalized traces to a downstream OTLP/gRPC collector.
pub struct OtlpTraceConsumer {
    client: TraceServiceClient<Channel>,
}

impl OtlpTraceConsumer {
    /// Connect to the downstream collector.
    pub async fn connect(endpoint: String) -> Result<Self, tonic::transport::Error> {
        let client = TraceServiceClient::connect(endpoint).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TraceConsumer for OtlpTraceConsumer {
    async fn consume(&self, trace: TracesData) -> Result<(), ConsumerError> {
        // Tonic clients are cheap to clone and need &mut for calls
        let mut client = self.client.clone();
        let request = ExportTraceServiceRequest {
            resource_spans: trace.resource_spans,
        };

        client
            .export(request)
            .await
            .map_err(|status| ConsumerError::new(status.to_string()))?;
        debug!("forwarded finalized trace downstream");
        Ok(())
    }
}
