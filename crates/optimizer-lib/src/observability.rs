//! Observability infrastructure for the optimizer
//!
//! Provides:
//! - Prometheus metrics (analysis latency, resource outcomes, savings found)
//! - Structured JSON event logging with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Gauge,
    Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for analysis runs (in seconds); runs call out to
/// several remote APIs per resource so they are slow
const ANALYSIS_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    analysis_duration_seconds: Histogram,
    analyses_total: IntCounter,
    analyses_failed: IntCounter,
    resources_analyzed: IntCounterVec,
    resource_errors: IntCounterVec,
    recommendations_generated: IntCounterVec,
    last_potential_savings: Gauge,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            analysis_duration_seconds: register_histogram!(
                "cost_optimizer_analysis_duration_seconds",
                "Wall time of a complete account analysis",
                ANALYSIS_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_duration_seconds"),

            analyses_total: register_int_counter!(
                "cost_optimizer_analyses_total",
                "Analyses started"
            )
            .expect("Failed to register analyses_total"),

            analyses_failed: register_int_counter!(
                "cost_optimizer_analyses_failed_total",
                "Analyses that failed at the request level"
            )
            .expect("Failed to register analyses_failed"),

            resources_analyzed: register_int_counter_vec!(
                "cost_optimizer_resources_analyzed_total",
                "Resources run through a recommendation rule",
                &["kind"]
            )
            .expect("Failed to register resources_analyzed"),

            resource_errors: register_int_counter_vec!(
                "cost_optimizer_resource_errors_total",
                "Resources skipped because a provider call failed",
                &["kind"]
            )
            .expect("Failed to register resource_errors"),

            recommendations_generated: register_int_counter_vec!(
                "cost_optimizer_recommendations_total",
                "Recommendations produced, by action",
                &["action"]
            )
            .expect("Failed to register recommendations_generated"),

            last_potential_savings: register_gauge!(
                "cost_optimizer_last_potential_savings",
                "Total potential annual savings of the most recent report"
            )
            .expect("Failed to register last_potential_savings"),
        }
    }
}

/// Handle to the process-wide optimizer metrics.
///
/// Clones share the same underlying registry entries.
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new)
    }

    pub fn observe_analysis_duration(&self, duration_secs: f64) {
        self.inner().analysis_duration_seconds.observe(duration_secs);
    }

    pub fn inc_analyses(&self) {
        self.inner().analyses_total.inc();
    }

    pub fn inc_analyses_failed(&self) {
        self.inner().analyses_failed.inc();
    }

    /// `kind` is "compute" or "storage"
    pub fn inc_resources_analyzed(&self, kind: &str) {
        self.inner()
            .resources_analyzed
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_resource_errors(&self, kind: &str) {
        self.inner().resource_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_recommendations(&self, action: &str) {
        self.inner()
            .recommendations_generated
            .with_label_values(&[action])
            .inc();
    }

    pub fn set_last_potential_savings(&self, savings: f64) {
        self.inner().last_potential_savings.set(savings);
    }
}

/// Structured logger for optimizer events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_analysis_started(&self, analysis_id: &str, region: &str, provider: &str) {
        info!(
            event = "analysis_started",
            service = %self.service,
            analysis_id = %analysis_id,
            region = %region,
            provider = %provider,
            "Account analysis started"
        );
    }

    pub fn log_analysis_completed(
        &self,
        analysis_id: &str,
        compute_recommendations: usize,
        storage_recommendations: usize,
        total_potential_savings: f64,
        degraded_sections: usize,
        elapsed_ms: u64,
    ) {
        info!(
            event = "analysis_completed",
            service = %self.service,
            analysis_id = %analysis_id,
            compute_recommendations,
            storage_recommendations,
            total_potential_savings,
            degraded_sections,
            elapsed_ms,
            "Account analysis completed"
        );
    }

    pub fn log_analysis_failed(&self, analysis_id: &str, error: &str) {
        warn!(
            event = "analysis_failed",
            service = %self.service,
            analysis_id = %analysis_id,
            error = %error,
            "Account analysis failed"
        );
    }

    /// A single resource was left out of the report
    pub fn log_resource_skipped(&self, kind: &str, resource_id: &str, error: &str) {
        warn!(
            event = "resource_skipped",
            service = %self.service,
            kind = %kind,
            resource_id = %resource_id,
            error = %error,
            "Resource excluded from report"
        );
    }

    /// A top-level section could not be fetched
    pub fn log_section_degraded(&self, section: &str, error: &str) {
        warn!(
            event = "section_degraded",
            service = %self.service,
            section = %section,
            error = %error,
            "Report section unavailable"
        );
    }

    pub fn log_negative_savings(&self, resource_id: &str, size_class: &str, target: &str, savings: f64) {
        warn!(
            event = "negative_savings",
            service = %self.service,
            resource_id = %resource_id,
            size_class = %size_class,
            target = %target,
            savings,
            "Downsize target is not cheaper than current size class"
        );
    }

    pub fn log_startup(&self, version: &str, provider: &str, store: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            provider = %provider,
            store = %store,
            "Cost optimizer API started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Cost optimizer API shutting down"
        );
    }
}
