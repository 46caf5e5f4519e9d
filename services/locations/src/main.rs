use anyhow::{Context, Result};
use location_service::{
    start_api_server, AppState, Config, LocationService, PgRecordStore, S3FileStore,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    info!(service = %config.service.name, "Starting GreenToGo Location Service");

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.service.metrics_port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    let record_store = PgRecordStore::new(&config.database)
        .await
        .context("Failed to initialize record store")?;

    if config.database.run_migrations {
        record_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let file_store = S3FileStore::new(&config.s3)
        .await
        .context("Failed to initialize S3 file store")?;

    let state = AppState {
        locations: Arc::new(LocationService::new(
            Arc::new(file_store),
            Arc::new(record_store),
        )),
        presigned_url_expiry: config.presigned_url_expiry(),
        max_qr_dimension: config.qr_code.max_dimension,
    };

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Location service stopped");

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("Shutdown signal received");
}
