//! Cost optimizer API
//!
//! Serves account analyses over HTTP together with health and
//! Prometheus endpoints.

use anyhow::Result;
use optimizer_api::{api, config::ServiceConfig};
use optimizer_lib::{
    health::{components, HealthRegistry},
    StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting optimizer-api");

    let config = ServiceConfig::load()?;
    info!(
        port = config.api_port,
        provider = ?config.provider.kind,
        store = ?config.store.kind,
        "Service configured"
    );

    let health_registry = HealthRegistry::with_components(&[
        components::PROVIDER,
        components::STORE,
        components::ANALYZER,
    ])
    .await;

    let logger = StructuredLogger::new("optimizer-api");
    let state = api::AppState::from_config(&config, health_registry.clone(), logger.clone()).await?;
    logger.log_startup(
        SERVICE_VERSION,
        state.providers.name(),
        &format!("{:?}", config.store.kind).to_lowercase(),
    );

    let app = api::create_router(Arc::new(state), api::cors_layer(&config.cors_origins)?);

    // Mark the service as ready after initialization
    health_registry.set_ready(true).await;

    let server = tokio::spawn(api::serve(config.api_port, app));

    tokio::select! {
        result = server => {
            let reason = match result {
                Ok(Ok(())) => "server exited".to_string(),
                Ok(Err(e)) => format!("server error: {:#}", e),
                Err(e) => format!("server task failed: {}", e),
            };
            error!(reason = %reason, "API server stopped");
            logger.log_shutdown(&reason);
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}
