//! 'main' for the chain follower process

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use follower_module_chain_db::{ChainDb, ChainDbConfig, ChainFollower, LoggingObserver};
use follower_module_peer_network_interface::{connect_peers, InterfaceConfig};
use std::sync::Arc;
use tracing::info;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, EnvFilter, Registry};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, value_name = "PATH", default_values_t = vec!["follower.toml".to_string()])]
    config: Vec<String>,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let args = Args::parse();

    // Standard logging using RUST_LOG for log levels
    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());

    // Only turn on tracing if some OTEL environment variables exist
    if std::env::vars().any(|(name, _)| name.starts_with("OTEL_")) {
        let otel_exporter = SpanExporter::builder().with_tonic().build()?;
        let otel_tracer = SdkTracerProvider::builder()
            .with_batch_exporter(otel_exporter)
            .build()
            .tracer("rust-otel-otlp");
        let otel_layer = OpenTelemetryLayer::new(otel_tracer)
            .with_filter(
                EnvFilter::from_default_env().add_directive(filter::LevelFilter::INFO.into()),
            )
            .with_filter(filter::filter_fn(|meta| meta.is_span()));
        Registry::default().with(fmt_layer).with(otel_layer).init();
    } else {
        Registry::default().with(fmt_layer).init();
    }

    info!("Chain follower process");

    let mut builder = Config::builder();
    for file in &args.config {
        builder = builder.add_source(File::with_name(file));
    }
    let config = builder
        .add_source(Environment::with_prefix("FOLLOWER"))
        .build()
        .context("reading configuration")?;

    let db_config = ChainDbConfig::try_load(&config)?;
    let interface_config = InterfaceConfig::try_load(&config)?;

    let chain_db = ChainDb::open(db_config).await.context("opening chain database")?;
    let mut follower = ChainFollower::new(chain_db, Arc::new(LoggingObserver));
    for peer in connect_peers(&interface_config) {
        follower.add_peer(peer);
    }

    tokio::select! {
        res = follower.run() => res?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    info!(tip = %follower.chain_db().volatile().tip(), "Exiting");
    Ok(())
}
