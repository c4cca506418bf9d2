//! HTTP API: account analysis, stored reports, health checks and
//! Prometheus metrics

use crate::config::{ProviderKind, ServiceConfig, StoreKind};
use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use optimizer_lib::{
    error::OptimizerError,
    health::{components, ComponentStatus, HealthRegistry},
    provider::{SnapshotProviderFactory, DEFAULT_REGION},
    store::new_analysis_id,
    Analyzer, CostReport, Credentials, FileReportStore, InMemoryReportStore, OptimizerMetrics,
    ProviderFactory, ReportStore, StructuredLogger,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub providers: Arc<dyn ProviderFactory>,
    pub store: Arc<dyn ReportStore>,
    pub health_registry: HealthRegistry,
    pub metrics: OptimizerMetrics,
    pub logger: StructuredLogger,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        analyzer: Arc<Analyzer>,
        providers: Arc<dyn ProviderFactory>,
        store: Arc<dyn ReportStore>,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            analyzer,
            providers,
            store,
            health_registry,
            metrics: OptimizerMetrics::new(),
            logger,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wire the analyzer, provider backend and report store from configuration
    pub async fn from_config(
        config: &ServiceConfig,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> anyhow::Result<Self> {
        config.rules.validate().context("Invalid rules configuration")?;
        config
            .pricing
            .validate()
            .context("Invalid pricing configuration")?;

        let analyzer = Analyzer::new(
            config.rules.clone(),
            Arc::new(config.pricing.price_table()),
            Arc::new(config.pricing.downsize_table()),
            config.analyzer.clone(),
        )
        .with_logger(logger.clone());

        let providers = provider_factory(config.provider.kind, &config.provider.snapshot_path)?;
        let store = report_store(config.store.kind, &config.store.dir).await?;

        Ok(Self::new(Arc::new(analyzer), providers, store, health_registry, logger)
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs)))
    }
}

fn provider_factory(
    kind: ProviderKind,
    snapshot_path: &std::path::Path,
) -> anyhow::Result<Arc<dyn ProviderFactory>> {
    match kind {
        ProviderKind::Snapshot => Ok(Arc::new(SnapshotProviderFactory::new(snapshot_path))),
        #[cfg(feature = "aws")]
        ProviderKind::Aws => Ok(Arc::new(optimizer_lib::provider::AwsProviderFactory)),
        #[cfg(not(feature = "aws"))]
        ProviderKind::Aws => {
            anyhow::bail!("provider kind \"aws\" requires building with the `aws` feature")
        }
    }
}

async fn report_store(
    kind: StoreKind,
    dir: &std::path::Path,
) -> anyhow::Result<Arc<dyn ReportStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(InMemoryReportStore::new())),
        StoreKind::File => {
            let store = FileReportStore::open(dir)
                .await
                .with_context(|| format!("Failed to open report store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Body of `POST /api/analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub aws_access_key: String,
    pub aws_secret_key: String,
    #[serde(default)]
    pub aws_region: Option<String>,
}

/// Errors returned to API callers as `{"error": message}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Timeout,
    Internal(String),
}

impl From<OptimizerError> for ApiError {
    fn from(err: OptimizerError) -> Self {
        match err {
            OptimizerError::Store(e) => ApiError::Internal(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Analysis timed out".to_string(),
            ),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn run_analysis(
    state: &AppState,
    credentials: &Credentials,
    analysis_id: &str,
    now: DateTime<Utc>,
) -> Result<CostReport, OptimizerError> {
    let provider = state.providers.connect(credentials).await?;
    let report = state
        .analyzer
        .analyze_at(provider.as_ref(), analysis_id, &credentials.region, now)
        .await?;
    Ok(report)
}

/// Analyze the account behind the supplied credentials and store the report
async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<CostReport>, ApiError> {
    let region = request
        .aws_region
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let credentials = Credentials::new(request.aws_access_key, request.aws_secret_key, region);

    let now = Utc::now();
    let analysis_id = new_analysis_id(now);
    state
        .logger
        .log_analysis_started(&analysis_id, &credentials.region, state.providers.name());

    let outcome = tokio::time::timeout(
        state.request_timeout,
        run_analysis(&state, &credentials, &analysis_id, now),
    )
    .await;

    let report = match outcome {
        Ok(Ok(report)) => {
            state.health_registry.set_healthy(components::PROVIDER).await;
            if report.errors().is_empty() {
                state.health_registry.set_healthy(components::ANALYZER).await;
            } else {
                let sections = report
                    .errors()
                    .iter()
                    .map(|e| format!("{:?}", e.section).to_lowercase())
                    .collect::<Vec<_>>()
                    .join(", ");
                state
                    .health_registry
                    .set_degraded(
                        components::ANALYZER,
                        format!("last analysis missing sections: {}", sections),
                    )
                    .await;
            }
            report
        }
        Ok(Err(err)) => {
            state
                .health_registry
                .set_degraded(components::PROVIDER, err.to_string())
                .await;
            return Err(err.into());
        }
        Err(_) => {
            state.metrics.inc_analyses_failed();
            state
                .logger
                .log_analysis_failed(&analysis_id, "request timed out");
            state
                .health_registry
                .set_degraded(components::ANALYZER, "last analysis timed out")
                .await;
            return Err(ApiError::Timeout);
        }
    };

    let stored = state.store.put(report.clone()).await;
    state
        .health_registry
        .observe(components::STORE, &stored)
        .await;
    if let Err(err) = stored {
        // The caller still gets the report; only later lookups miss it
        error!(analysis_id = %analysis_id, error = %err, "Failed to store report");
    }

    Ok(Json(report))
}

/// Fetch a previously generated report
async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(analysis_id): Path<String>,
) -> Result<Json<CostReport>, ApiError> {
    let fetched = state.store.get(&analysis_id).await;
    state
        .health_registry
        .observe(components::STORE, &fetched)
        .await;

    match fetched {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(ApiError::NotFound("Analysis not found".to_string())),
        Err(err) => Err(ApiError::Internal(err.to_string())),
    }
}

/// Liveness for browser clients
async fn api_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::Internal(err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// CORS policy for the configured origins
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/analysis/:id", get(get_analysis))
        .route("/api/health", get(api_health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, app: Router) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_origins() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&["*".to_string()]).is_ok());
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["http://bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_optimizer_errors_map_to_status() {
        let err = ApiError::from(OptimizerError::Provider(
            optimizer_lib::ProviderError::Auth("bad key".into()),
        ));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(OptimizerError::Store(optimizer_lib::StoreError::InvalidId(
            "..".into(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_aws_kind_needs_feature() {
        let result = provider_factory(ProviderKind::Aws, std::path::Path::new("x.json"));
        assert_eq!(result.is_ok(), cfg!(feature = "aws"));
    }
}
