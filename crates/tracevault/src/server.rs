//! OTLP/gRPC log intake
//!
//! A thin tonic server in front of the ingestor. Emitters point their OTLP
//! logs exporter at this endpoint; everything past the request boundary is
//! the pipeline crate's job.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::{
    LogsService, LogsServiceServer,
};
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use tonic::{Request, Response, Status};
use tracing::{error, info};
use tracevault_pipeline::Ingestor;

/// gRPC intake handing log batches to the ingestor.
pub struct LogIntake {
    ingestor: Arc<Ingestor>,
}

impl LogIntake {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), tonic::transport::Error> {
        info!(%addr, "log intake listening");
        tonic::transport::Server::builder()
            .add_service(LogsServiceServer::new(self))
            .serve_with_shutdown(addr, shutdown)
            .await
    }
}

#[tonic::async_trait]
impl LogsService for LogIntake {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let logs = LogsData {
            resource_logs: request.into_inner().resource_logs,
        };

        if let Err(err) = self.ingestor.consume(logs).await {
            error!(error = %err, "failed to ingest log batch");
            return Err(Status::internal(err.to_string()));
        }

        Ok(Response::new(ExportLogsServiceResponse::default()))
    }
}
