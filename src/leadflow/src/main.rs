//! Leadflow — lead intelligence and personalization resolution service.
//!
//! Main entry point that wires the stores, engines and the Maestro worker
//! together and starts the server.

use clap::Parser;
use leadflow_api::{ApiServer, AppState};
use leadflow_core::config::AppConfig;
use leadflow_core::event_bus::TracingSink;
use leadflow_core::MemoryStore;
use leadflow_intelligence::{ChurnPredictor, LeadScorer, LtvEstimator, PropensityEngine};
use leadflow_personalization::{Maestro, PersonalizationResolver};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Lead intelligence and personalization resolution engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LEADFLOW__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LEADFLOW__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "LEADFLOW__METRICS__PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadflow=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Leadflow starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    // In-process store backing every store interface
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(TracingSink);

    let scorer = LeadScorer::new(
        PropensityEngine::new(config.propensity.clone()),
        store.clone(),
        store.clone(),
    );

    // Start the Maestro worker
    let maestro = Arc::new(
        Maestro::new(
            config.maestro.clone(),
            config.propensity.weights.clone(),
            scorer.clone(),
            store.clone(),
        )
        .with_event_sink(sink.clone()),
    );
    let (maestro_handle, _maestro_worker) = maestro.spawn();
    info!(
        queue_capacity = config.maestro.queue_capacity,
        "Maestro worker started"
    );

    let state = AppState {
        resolver: Arc::new(PersonalizationResolver::new(
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        churn: Arc::new(
            ChurnPredictor::new(config.churn.clone(), store.clone(), store.clone())
                .with_event_sink(sink),
        ),
        ltv: Arc::new(LtvEstimator::new(
            config.ltv.clone(),
            store.clone(),
            store.clone(),
        )),
        scorer,
        events: store,
        maestro: maestro_handle,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };

    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Leadflow is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
