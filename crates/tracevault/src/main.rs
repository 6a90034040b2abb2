//! tracevault - trace reconstruction for processes that die mid-span
//!
//! Heartbeat log records keep the current in-progress span persisted in
//! Postgres; stop records withdraw it; a background collector promotes
//! expired heartbeats into finalized traces and forwards them downstream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use tracevault_pipeline::{CollectorConfig, LoggingConsumer, Service, TraceConsumer};
use tracevault_store::Store;

mod config;
mod forward;
mod server;

use config::Config;
use forward::OtlpTraceConsumer;
use server::LogIntake;

#[derive(Parser)]
#[command(name = "tracevault")]
#[command(version)]
#[command(about = "Reconstructs traces from processes that die before their spans finish", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TRACEVAULT_CONFIG")]
    config: PathBuf,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    init_logging(&config.log_level, cli.verbose)?;

    let store = Store::connect(&config.postgres)
        .await
        .context("failed to connect to postgres")?;
    store
        .ensure_schema()
        .await
        .context("failed to ensure partial_traces schema")?;

    let consumer: Arc<dyn TraceConsumer> = match &config.downstream {
        Some(endpoint) => {
            info!(endpoint, "forwarding finalized traces downstream");
            Arc::new(
                OtlpTraceConsumer::connect(endpoint.clone())
                    .await
                    .context("failed to connect to downstream collector")?,
            )
        }
        None => {
            warn!("no downstream configured; finalized traces are logged and dropped");
            Arc::new(LoggingConsumer)
        }
    };

    let mut service = Service::start(
        store,
        consumer,
        config.expiry_factor,
        CollectorConfig {
            gc_interval: config.gc_interval,
        },
    );

    let addr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.listen))?;
    LogIntake::new(service.ingestor())
        .serve(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("log intake server failed")?;

    service.shutdown().await;
    Ok(())
}

fn init_logging(log_level: &str, verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => log_level
            .parse()
            .with_context(|| format!("invalid log level {log_level:?}"))?,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
