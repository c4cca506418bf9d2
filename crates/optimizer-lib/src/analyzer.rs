//! Account analysis
//!
//! Runs the compute and storage rules over every resource a provider
//! reports and assembles the results into a [`CostReport`].
//!
//! Per-resource work is fanned out over an order-preserving buffered stream,
//! so the concurrency bound never changes the output order. A failure for
//! one resource only removes that resource; a failing top-level listing is
//! recorded on the report as a [`SectionError`].

use crate::error::{OptimizerError, ProviderError, Result};
use crate::models::{
    BillingSummary, ComputeAction, ComputeRecommendation, ComputeResource, CostReport,
    ReportSection, SectionError, StorageContainer, StorageRecommendation,
};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::pricing::{DownsizeTable, PriceTable};
use crate::provider::MetricsProvider;
use crate::rules::{average_utilization, ComputeRule, RuleConfig, StorageRule};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Default number of resources analyzed concurrently
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Upper bound on concurrent per-resource provider calls
    pub max_concurrency: usize,
    /// Only report instances whose average utilization is below this value
    pub include_ceiling: Option<f64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            include_ceiling: None,
        }
    }
}

pub struct Analyzer {
    compute: ComputeRule,
    storage: StorageRule,
    rules: RuleConfig,
    config: AnalyzerConfig,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl Analyzer {
    pub fn new(
        rules: RuleConfig,
        prices: Arc<PriceTable>,
        downsizes: Arc<DownsizeTable>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            compute: ComputeRule::new(rules.clone(), prices, downsizes),
            storage: StorageRule::new(rules.clone()),
            rules,
            config,
            metrics: OptimizerMetrics::new(),
            logger: StructuredLogger::new("analyzer"),
        }
    }

    /// Analyzer with reference prices, downsize map and thresholds
    pub fn with_defaults() -> Self {
        Self::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
            AnalyzerConfig::default(),
        )
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Analyze the account behind `provider` as of now
    pub async fn analyze(
        &self,
        provider: &dyn MetricsProvider,
        analysis_id: &str,
        region: &str,
    ) -> Result<CostReport> {
        self.analyze_at(provider, analysis_id, region, Utc::now()).await
    }

    /// Analyze the account as of `now`
    pub async fn analyze_at(
        &self,
        provider: &dyn MetricsProvider,
        analysis_id: &str,
        region: &str,
        now: DateTime<Utc>,
    ) -> Result<CostReport> {
        let started = std::time::Instant::now();
        self.metrics.inc_analyses();

        let (compute, storage, billing) = tokio::join!(
            self.analyze_compute(provider, now),
            self.analyze_storage(provider, now),
            self.billing_summary(provider, now),
        );

        let mut errors = Vec::new();
        let mut worst_error: Option<ProviderError> = None;

        let compute = self.section(ReportSection::Compute, compute, &mut errors, &mut worst_error);
        let storage = self.section(ReportSection::Storage, storage, &mut errors, &mut worst_error);
        let billing = self.section(ReportSection::Billing, billing, &mut errors, &mut worst_error);

        if let Some(err) = worst_error.filter(|e| e.is_auth()) {
            self.metrics.inc_analyses_failed();
            self.logger.log_analysis_failed(analysis_id, &err.to_string());
            return Err(err.into());
        }

        if errors.len() == 3 {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            self.metrics.inc_analyses_failed();
            self.logger.log_analysis_failed(analysis_id, &message);
            return Err(OptimizerError::AllSectionsFailed(message));
        }

        let report = CostReport::new(
            analysis_id,
            region,
            now,
            compute.unwrap_or_default(),
            storage.unwrap_or_default(),
            billing,
            errors,
        );

        let elapsed = started.elapsed();
        self.metrics.observe_analysis_duration(elapsed.as_secs_f64());
        self.metrics
            .set_last_potential_savings(report.total_potential_savings());
        self.logger.log_analysis_completed(
            analysis_id,
            report.compute_recommendations().len(),
            report.storage_recommendations().len(),
            report.total_potential_savings(),
            report.errors().len(),
            elapsed.as_millis() as u64,
        );

        Ok(report)
    }

    /// Unwrap a section result, recording a section error on failure
    fn section<T>(
        &self,
        section: ReportSection,
        result: std::result::Result<T, ProviderError>,
        errors: &mut Vec<SectionError>,
        worst_error: &mut Option<ProviderError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let name = match section {
                    ReportSection::Compute => "compute",
                    ReportSection::Storage => "storage",
                    ReportSection::Billing => "billing",
                };
                self.logger.log_section_degraded(name, &err.to_string());
                errors.push(SectionError {
                    section,
                    message: err.to_string(),
                });
                if worst_error.as_ref().map_or(true, |e| !e.is_auth()) {
                    *worst_error = Some(err);
                }
                None
            }
        }
    }

    /// Recommendations for every sampled instance, most expensive first
    async fn analyze_compute(
        &self,
        provider: &dyn MetricsProvider,
        now: DateTime<Utc>,
    ) -> std::result::Result<Vec<ComputeRecommendation>, ProviderError> {
        let resources = provider.list_compute_resources().await?;
        let start = now - Duration::days(self.rules.utilization_window_days);

        let mut recommendations: Vec<ComputeRecommendation> = stream::iter(resources)
            .map(|resource| self.analyze_instance(provider, resource, start, now))
            .buffered(self.config.max_concurrency.max(1))
            .filter_map(|rec| async move { rec })
            .collect()
            .await;

        // Stable: ties keep discovery order
        recommendations.sort_by(|a, b| {
            b.annual_cost
                .partial_cmp(&a.annual_cost)
                .unwrap_or(Ordering::Equal)
        });

        Ok(recommendations)
    }

    async fn analyze_instance(
        &self,
        provider: &dyn MetricsProvider,
        resource: ComputeResource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<ComputeRecommendation> {
        let samples = match provider
            .get_utilization(&resource.id, start, end, self.rules.utilization_period_secs)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                self.metrics.inc_resource_errors("compute");
                self.logger
                    .log_resource_skipped("compute", &resource.id, &e.to_string());
                return None;
            }
        };

        self.metrics.inc_resources_analyzed("compute");

        // Compared against the exact mean; the reported figure is rounded
        if let Some(ceiling) = self.config.include_ceiling {
            if average_utilization(&samples).is_some_and(|avg| avg >= ceiling) {
                debug!(instance = %resource.id, ceiling, "Above include ceiling, skipping");
                return None;
            }
        }

        let Some(rec) = self.compute.recommend(&resource, &samples) else {
            debug!(instance = %resource.id, "No utilization samples in window, skipping");
            return None;
        };

        let action = match &rec.action {
            ComputeAction::Terminate => "terminate",
            ComputeAction::Downsize { target } => {
                if rec.warning.is_some() {
                    self.logger
                        .log_negative_savings(&rec.resource_id, &rec.size_class, target, rec.savings);
                }
                "downsize"
            }
            ComputeAction::Monitor => "monitor",
        };
        self.metrics.inc_recommendations(action);

        Some(rec)
    }

    /// Recommendations for buckets holding aged objects, in discovery order
    async fn analyze_storage(
        &self,
        provider: &dyn MetricsProvider,
        now: DateTime<Utc>,
    ) -> std::result::Result<Vec<StorageRecommendation>, ProviderError> {
        let containers = provider.list_storage_containers().await?;

        let recommendations: Vec<StorageRecommendation> = stream::iter(containers)
            .map(|container| self.analyze_container(provider, container, now))
            .buffered(self.config.max_concurrency.max(1))
            .filter_map(|rec| async move { rec })
            .collect()
            .await;

        Ok(recommendations)
    }

    async fn analyze_container(
        &self,
        provider: &dyn MetricsProvider,
        container: StorageContainer,
        now: DateTime<Utc>,
    ) -> Option<StorageRecommendation> {
        match self.scan_container(provider, &container, now).await {
            Ok(rec) => {
                self.metrics.inc_resources_analyzed("storage");
                if rec.is_some() {
                    self.metrics.inc_recommendations("archive");
                }
                rec
            }
            Err(e) => {
                self.metrics.inc_resource_errors("storage");
                self.logger
                    .log_resource_skipped("storage", &container.id, &e.to_string());
                None
            }
        }
    }

    async fn scan_container(
        &self,
        provider: &dyn MetricsProvider,
        container: &StorageContainer,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<StorageRecommendation>, ProviderError> {
        let Some(size_bytes) = provider.get_container_size(&container.id).await? else {
            debug!(bucket = %container.id, "No size datapoint, skipping");
            return Ok(None);
        };
        let aged = self.storage.scan(provider, &container.id, now).await?;
        Ok(self.storage.recommend(&container.id, size_bytes, &aged))
    }

    async fn billing_summary(
        &self,
        provider: &dyn MetricsProvider,
        now: DateTime<Utc>,
    ) -> std::result::Result<BillingSummary, ProviderError> {
        let window = self.rules.billing_window_days;
        let start = now - Duration::days(i64::from(window));
        let costs = provider.get_billing_summary(start, now).await?;
        Ok(BillingSummary::from_services(costs, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectPage, StorageObject, UtilizationSample};
    use crate::provider::{
        async_trait, AccountSnapshot, BucketSnapshot, InstanceSnapshot, ProviderResult,
        SnapshotProvider,
    };
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashSet};

    const GB: u64 = 1024 * 1024 * 1024;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn instance(id: &str, size_class: &str, utilization: &[f64]) -> InstanceSnapshot {
        InstanceSnapshot {
            resource: ComputeResource {
                id: id.to_string(),
                size_class: size_class.to_string(),
                launch_time: now() - Duration::days(365),
                tags: BTreeMap::new(),
            },
            samples: utilization
                .iter()
                .enumerate()
                .map(|(i, u)| UtilizationSample {
                    timestamp: now() - Duration::hours(i as i64 + 1),
                    average_percent: *u,
                })
                .collect(),
        }
    }

    fn bucket(name: &str, size_bytes: u64, ages_days: &[(u64, i64)]) -> BucketSnapshot {
        BucketSnapshot {
            name: name.to_string(),
            size_bytes: Some(size_bytes),
            objects: ages_days
                .iter()
                .enumerate()
                .map(|(i, (size, age))| StorageObject {
                    key: format!("{}/{}", name, i),
                    size_bytes: *size,
                    last_modified: now() - Duration::days(*age),
                })
                .collect(),
        }
    }

    fn account() -> AccountSnapshot {
        let mut billing = BTreeMap::new();
        billing.insert("Amazon Elastic Compute Cloud - Compute".to_string(), 250.0);
        billing.insert("Amazon Simple Storage Service".to_string(), 50.0);

        AccountSnapshot {
            instances: vec![
                instance("i-small-idle", "t3.medium", &[1.0, 2.0]),
                instance("i-big-idle", "m5.xlarge", &[3.0, 3.0, 3.0]),
                instance("i-light", "t3.medium", &[10.0]),
                instance("i-busy", "m5.large", &[60.0, 70.0]),
                instance("i-no-samples", "m5.xlarge", &[]),
            ],
            buckets: vec![
                bucket("fresh", 500 * GB, &[(10 * GB, 5)]),
                bucket("stale", 200 * GB, &[(60 * GB, 120), (40 * GB, 365), (GB, 2)]),
            ],
            billing,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    /// Wraps a snapshot and fails selected calls
    struct FlakyProvider {
        inner: SnapshotProvider,
        failing_resources: HashSet<String>,
        fail_compute_listing: Option<ProviderError>,
        fail_storage_listing: Option<ProviderError>,
        fail_billing: Option<ProviderError>,
    }

    impl FlakyProvider {
        fn new(snapshot: AccountSnapshot) -> Self {
            Self {
                inner: SnapshotProvider::new(snapshot).with_page_size(1),
                failing_resources: HashSet::new(),
                fail_compute_listing: None,
                fail_storage_listing: None,
                fail_billing: None,
            }
        }

        fn check(&self, id: &str) -> ProviderResult<()> {
            if self.failing_resources.contains(id) {
                return Err(ProviderError::Request(format!("throttled on {}", id)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsProvider for FlakyProvider {
        async fn list_compute_resources(&self) -> ProviderResult<Vec<ComputeResource>> {
            if let Some(err) = &self.fail_compute_listing {
                return Err(err.clone());
            }
            self.inner.list_compute_resources().await
        }

        async fn get_utilization(
            &self,
            resource_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            period_secs: i32,
        ) -> ProviderResult<Vec<UtilizationSample>> {
            self.check(resource_id)?;
            self.inner
                .get_utilization(resource_id, start, end, period_secs)
                .await
        }

        async fn list_storage_containers(&self) -> ProviderResult<Vec<StorageContainer>> {
            if let Some(err) = &self.fail_storage_listing {
                return Err(err.clone());
            }
            self.inner.list_storage_containers().await
        }

        async fn get_container_size(&self, container_id: &str) -> ProviderResult<Option<u64>> {
            self.inner.get_container_size(container_id).await
        }

        async fn list_objects(
            &self,
            container_id: &str,
            continuation: Option<&str>,
        ) -> ProviderResult<ObjectPage> {
            self.check(container_id)?;
            self.inner.list_objects(container_id, continuation).await
        }

        async fn get_billing_summary(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> ProviderResult<BTreeMap<String, f64>> {
            if let Some(err) = &self.fail_billing {
                return Err(err.clone());
            }
            self.inner.get_billing_summary(start, end).await
        }
    }

    async fn run(provider: &dyn MetricsProvider) -> Result<CostReport> {
        Analyzer::with_defaults()
            .analyze_at(provider, "analysis_test", "us-east-1", now())
            .await
    }

    #[tokio::test]
    async fn test_full_report() {
        let provider = FlakyProvider::new(account());
        let report = run(&provider).await.unwrap();

        let ids: Vec<_> = report
            .compute_recommendations()
            .iter()
            .map(|r| r.resource_id.as_str())
            .collect();
        // Sorted by annual cost; the two t3.medium instances tie and keep
        // discovery order. The instance without samples is skipped.
        assert_eq!(ids, vec!["i-big-idle", "i-busy", "i-small-idle", "i-light"]);

        let big = &report.compute_recommendations()[0];
        assert_eq!(big.action, ComputeAction::Terminate);
        assert_close(big.savings, 1681.92);

        let light = &report.compute_recommendations()[3];
        assert_eq!(
            light.action,
            ComputeAction::Downsize {
                target: "t3.small".to_string()
            }
        );
        assert_close(light.savings, 182.208);

        assert_eq!(report.storage_recommendations().len(), 1);
        let stale = &report.storage_recommendations()[0];
        assert_eq!(stale.container_id, "stale");
        assert_eq!(stale.aged_object_count, 2);
        assert_eq!(stale.aged_size_bytes, 100 * GB);
        assert_close(stale.savings, 22.265625);

        let billing = report.cost_summary().unwrap();
        assert_eq!(billing.total_cost, 300.0);
        assert_eq!(billing.period_days, 30);

        assert!(report.errors().is_empty());
        assert_eq!(report.analysis_id(), "analysis_test");
        assert_eq!(report.timestamp(), now());
    }

    #[tokio::test]
    async fn test_total_matches_sum_of_savings() {
        let provider = FlakyProvider::new(account());
        let report = run(&provider).await.unwrap();

        let expected = report
            .compute_recommendations()
            .iter()
            .map(|r| r.savings)
            .fold(0.0, |acc, s| acc + s)
            + report
                .storage_recommendations()
                .iter()
                .map(|r| r.savings)
                .fold(0.0, |acc, s| acc + s);

        assert_eq!(report.total_potential_savings(), expected);
    }

    #[tokio::test]
    async fn test_compute_sorted_non_increasing() {
        let mut snapshot = account();
        snapshot.instances.push(instance("i-unknown", "c5.large", &[30.0]));
        snapshot.instances.push(instance("i-micro", "t2.micro", &[30.0]));

        let provider = FlakyProvider::new(snapshot);
        let report = run(&provider).await.unwrap();

        let costs: Vec<f64> = report
            .compute_recommendations()
            .iter()
            .map(|r| r.annual_cost)
            .collect();
        assert!(costs.windows(2).all(|w| w[0] >= w[1]), "{:?}", costs);
    }

    #[tokio::test]
    async fn test_order_independent_of_concurrency() {
        let provider = FlakyProvider::new(account());

        let serial = Analyzer::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
            AnalyzerConfig {
                max_concurrency: 1,
                include_ceiling: None,
            },
        )
        .analyze_at(&provider, "a", "us-east-1", now())
        .await
        .unwrap();

        let parallel = Analyzer::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
            AnalyzerConfig {
                max_concurrency: 16,
                include_ceiling: None,
            },
        )
        .analyze_at(&provider, "a", "us-east-1", now())
        .await
        .unwrap();

        assert_eq!(serial, parallel);
    }

    #[tokio::test]
    async fn test_resource_failures_are_isolated() {
        let mut provider = FlakyProvider::new(account());
        provider.failing_resources.insert("i-big-idle".to_string());
        provider.failing_resources.insert("stale".to_string());

        let report = run(&provider).await.unwrap();

        assert!(report
            .compute_recommendations()
            .iter()
            .all(|r| r.resource_id != "i-big-idle"));
        assert_eq!(report.compute_recommendations().len(), 3);
        assert!(report.storage_recommendations().is_empty());
        // Per-resource failures do not mark sections degraded
        assert!(report.errors().is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_degrades_section() {
        let mut provider = FlakyProvider::new(account());
        provider.fail_compute_listing = Some(ProviderError::Unavailable("timeout".to_string()));
        provider.fail_billing = Some(ProviderError::Request("ce disabled".to_string()));

        let report = run(&provider).await.unwrap();

        assert!(report.compute_recommendations().is_empty());
        assert!(report.cost_summary().is_none());
        assert_eq!(report.storage_recommendations().len(), 1);
        assert!(report.is_degraded());

        let sections: Vec<_> = report.errors().iter().map(|e| e.section).collect();
        assert_eq!(sections, vec![ReportSection::Compute, ReportSection::Billing]);
        assert_close(
            report.total_potential_savings(),
            report.storage_recommendations()[0].savings,
        );
    }

    #[tokio::test]
    async fn test_auth_failure_fails_request() {
        let mut provider = FlakyProvider::new(account());
        provider.fail_billing = Some(ProviderError::Auth("InvalidClientTokenId".to_string()));

        let err = run(&provider).await.unwrap_err();
        assert!(matches!(err, OptimizerError::Provider(ProviderError::Auth(_))));
    }

    #[tokio::test]
    async fn test_all_sections_failing_fails_request() {
        let mut provider = FlakyProvider::new(account());
        let down = ProviderError::Unavailable("connection refused".to_string());
        provider.fail_compute_listing = Some(down.clone());
        provider.fail_storage_listing = Some(down.clone());
        provider.fail_billing = Some(down);

        let err = run(&provider).await.unwrap_err();
        assert!(matches!(err, OptimizerError::AllSectionsFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_account() {
        let provider = SnapshotProvider::new(AccountSnapshot::default());
        let report = run(&provider).await.unwrap();

        assert!(report.compute_recommendations().is_empty());
        assert!(report.storage_recommendations().is_empty());
        assert_eq!(report.total_potential_savings(), 0.0);
        assert_eq!(report.cost_summary().unwrap().total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_empty_and_unmetered_buckets_are_skipped() {
        let mut snapshot = AccountSnapshot::default();
        snapshot.buckets.push(bucket("empty", 0, &[]));
        snapshot.buckets.push(BucketSnapshot {
            name: "unmetered".to_string(),
            size_bytes: None,
            objects: vec![StorageObject {
                key: "old".to_string(),
                size_bytes: GB,
                last_modified: now() - Duration::days(400),
            }],
        });

        let provider = SnapshotProvider::new(snapshot);
        let report = run(&provider).await.unwrap();
        assert!(report.storage_recommendations().is_empty());
    }

    #[tokio::test]
    async fn test_include_ceiling_filters_busy_instances() {
        let provider = FlakyProvider::new(account());
        let analyzer = Analyzer::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
            AnalyzerConfig {
                max_concurrency: 4,
                include_ceiling: Some(10.0),
            },
        );

        let report = analyzer
            .analyze_at(&provider, "a", "us-east-1", now())
            .await
            .unwrap();
        let ids: Vec<_> = report
            .compute_recommendations()
            .iter()
            .map(|r| r.resource_id.as_str())
            .collect();
        assert_eq!(ids, vec!["i-big-idle", "i-small-idle"]);
    }

    #[tokio::test]
    async fn test_include_ceiling_uses_exact_average() {
        let snapshot = AccountSnapshot {
            instances: vec![
                instance("i-just-under", "t3.medium", &[9.996]),
                instance("i-at-ceiling", "t3.medium", &[10.0]),
            ],
            ..Default::default()
        };
        let provider = SnapshotProvider::new(snapshot);
        let analyzer = Analyzer::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
            AnalyzerConfig {
                max_concurrency: 2,
                include_ceiling: Some(10.0),
            },
        );

        let report = analyzer
            .analyze_at(&provider, "a", "us-east-1", now())
            .await
            .unwrap();

        let recs = report.compute_recommendations();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].resource_id, "i-just-under");
        // Rounded for display, yet still included
        assert_eq!(recs[0].avg_utilization, 10.0);
    }

    #[tokio::test]
    async fn test_samples_outside_window_are_ignored() {
        let mut old = instance("i-old", "m5.xlarge", &[1.0]);
        old.samples[0].timestamp = now() - Duration::days(30);

        let snapshot = AccountSnapshot {
            instances: vec![old],
            ..Default::default()
        };
        let provider = SnapshotProvider::new(snapshot);
        let report = run(&provider).await.unwrap();
        assert!(report.compute_recommendations().is_empty());
    }
}
