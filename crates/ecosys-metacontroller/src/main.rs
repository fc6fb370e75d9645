//! Ecosys meta-controller binary

use std::sync::Arc;

use anyhow::{Context, Result};
use ecosys_common::{LogNotifier, VERSION};
use ecosys_metacontroller::{logging, telemetry, ControllerConfig, JsonFileStore, MetaController};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::load()?;
    let _log_guard = logging::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        environment = ?config.environment,
        survival_rate = config.evolution.survival_rate,
        generation_interval_minutes = config.evolution.generation_interval_minutes,
        max_position_size = config.trading.max_position_size,
        max_drawdown_limit = config.trading.max_drawdown_limit,
        "Starting Ecosys meta-controller"
    );

    let registry = prometheus::Registry::new();
    let metrics_interval = config.metrics_log_interval();
    let store = Arc::new(JsonFileStore::new(&config.persistence.data_directory));
    let shutdown = CancellationToken::new();

    let controller = MetaController::new(config, store, Arc::new(LogNotifier))
        .context("Failed to build controller")?
        .with_cancellation(shutdown.clone());
    controller
        .metrics()
        .register(&registry)
        .context("Failed to register metrics")?;

    let reporter = metrics_interval.map(|every| {
        telemetry::spawn_reporter(registry.clone(), every, shutdown.clone())
    });

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let report = controller.run().await?;
    if let Some(reporter) = reporter {
        if let Err(e) = reporter.await {
            error!(error = %e, "Metrics reporter panicked");
        }
    }
    info!(
        terminated = report.terminated,
        generation = report.generation,
        allocated_fraction = report.allocation.allocated_fraction(),
        "Shutdown complete"
    );
    Ok(())
}
