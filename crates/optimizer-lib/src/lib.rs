//! Cloud cost optimizer engine
//!
//! This crate provides the core functionality for:
//! - Querying compute, storage and billing data from a cloud account
//! - Rightsizing and archival recommendation rules
//! - Aggregating recommendations into cost reports
//! - Report storage
//! - Health checks and observability

pub mod analyzer;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod provider;
pub mod rules;
pub mod store;

pub use analyzer::{Analyzer, AnalyzerConfig};
pub use error::{OptimizerError, ProviderError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OptimizerMetrics, StructuredLogger};
pub use pricing::{DownsizeTable, PriceTable, PricingConfig};
pub use provider::{Credentials, MetricsProvider, ProviderFactory};
pub use rules::RuleConfig;
pub use store::{FileReportStore, InMemoryReportStore, ReportStore};
