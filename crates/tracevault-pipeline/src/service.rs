//! Service lifecycle
//!
//! Owns the store and the collector task. The collector's cancellation
//! root is the service itself, not the caller's context, so a caller-side
//! timeout never pre-empts an in-flight transaction.

use std::sync::Arc;

use tracing::info;
use tracevault_store::Store;

use crate::consumer::TraceConsumer;
use crate::gc::{Collector, CollectorConfig, CollectorHandle};
use crate::ingest::Ingestor;

/// The assembled partial-trace service: shared store, ingestor, and a
/// running collector.
pub struct Service {
    store: Store,
    ingestor: Arc<Ingestor>,
    collector: CollectorHandle,
}

impl Service {
    /// Wire the components and start the collector task. Returns
    /// immediately; the first collection pass happens after the first
    /// jittered wait.
    pub fn start(
        store: Store,
        consumer: Arc<dyn TraceConsumer>,
        expiry_factor: u32,
        config: CollectorConfig,
    ) -> Self {
        let ingestor = Arc::new(Ingestor::new(store.clone(), expiry_factor));
        let collector = Arc::new(Collector::new(store.clone(), consumer, config)).spawn();
        info!("service started");
        Self {
            store,
            ingestor,
            collector,
        }
    }

    /// The shared ingestor, for intake surfaces.
    pub fn ingestor(&self) -> Arc<Ingestor> {
        Arc::clone(&self.ingestor)
    }

    /// Stop the collector, wait for its loop to acknowledge exit, then
    /// close the store. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.collector.shutdown().await;
        self.store.close().await;
        info!("service stopped");
    }
}
