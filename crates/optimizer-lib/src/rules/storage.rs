//! Object-storage archival rule

use super::RuleConfig;
use crate::error::ProviderError;
use crate::models::{round2, StorageObject, StorageRecommendation};
use crate::pricing::MONTHS_PER_YEAR;
use crate::provider::MetricsProvider;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

const GB_PER_TB: f64 = 1024.0;

/// Upper bound on inventory pages scanned per bucket
const MAX_PAGES: usize = 100_000;

/// Running count of objects older than a cutoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgedObjectTally {
    cutoff: DateTime<Utc>,
    count: u64,
    size_bytes: u64,
}

impl AgedObjectTally {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            count: 0,
            size_bytes: 0,
        }
    }

    pub fn observe(&mut self, object: &StorageObject) {
        if object.last_modified < self.cutoff {
            self.count += 1;
            self.size_bytes = self.size_bytes.saturating_add(object.size_bytes);
        }
    }

    pub fn observe_page(&mut self, objects: &[StorageObject]) {
        for object in objects {
            self.observe(object);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Aged-object footprint of one bucket and the savings of archiving it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgedObjectSummary {
    pub count: u64,
    pub size_bytes: u64,
    /// Annual savings of moving the aged subset to the archival tier
    pub estimated_savings: f64,
}

impl AgedObjectSummary {
    pub fn empty() -> Self {
        Self {
            count: 0,
            size_bytes: 0,
            estimated_savings: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageRule {
    config: RuleConfig,
}

impl StorageRule {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    /// Objects last modified before this instant are aged
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.config.aged_object_days)
    }

    /// Standard-tier monthly cost of storing `size_bytes`
    pub fn standard_monthly_cost(&self, size_bytes: f64) -> f64 {
        size_bytes / BYTES_PER_GB / GB_PER_TB * self.config.standard_tb_month
    }

    /// Archival-tier monthly cost of storing `size_bytes`
    pub fn archival_monthly_cost(&self, size_bytes: f64) -> f64 {
        size_bytes / BYTES_PER_GB / GB_PER_TB * self.config.archival_tb_month
    }

    /// Annual savings of moving `size_bytes` from standard to archival
    pub fn archival_savings(&self, size_bytes: u64) -> f64 {
        let bytes = size_bytes as f64;
        (self.standard_monthly_cost(bytes) - self.archival_monthly_cost(bytes)) * MONTHS_PER_YEAR
    }

    pub fn summarize(&self, tally: &AgedObjectTally) -> AgedObjectSummary {
        if tally.count() == 0 {
            return AgedObjectSummary::empty();
        }
        AgedObjectSummary {
            count: tally.count(),
            size_bytes: tally.size_bytes(),
            estimated_savings: self.archival_savings(tally.size_bytes()),
        }
    }

    /// Scan a bucket's inventory page by page and summarize its aged objects
    pub async fn scan(
        &self,
        provider: &dyn MetricsProvider,
        container_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AgedObjectSummary, ProviderError> {
        let mut tally = AgedObjectTally::new(self.cutoff(now));
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = provider.list_objects(container_id, token.as_deref()).await?;
            pages += 1;

            if pages == 1 && page.objects.is_empty() && page.next_token.is_none() {
                return Ok(AgedObjectSummary::empty());
            }

            tally.observe_page(&page.objects);

            match page.next_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    return Err(ProviderError::Request(format!(
                        "object listing for {} repeated continuation token",
                        container_id
                    )));
                }
                Some(_) if pages >= MAX_PAGES => {
                    return Err(ProviderError::Request(format!(
                        "object listing for {} exceeded {} pages",
                        container_id, MAX_PAGES
                    )));
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(
            bucket = %container_id,
            pages,
            aged_objects = tally.count(),
            aged_bytes = tally.size_bytes(),
            "Scanned bucket inventory"
        );

        Ok(self.summarize(&tally))
    }

    /// Build a recommendation for a bucket, `None` when nothing is aged
    pub fn recommend(
        &self,
        container_id: &str,
        size_bytes: u64,
        aged: &AgedObjectSummary,
    ) -> Option<StorageRecommendation> {
        if aged.count == 0 {
            return None;
        }

        let size_gb = size_bytes as f64 / BYTES_PER_GB;
        let monthly_cost = size_gb / GB_PER_TB * self.config.standard_tb_month;

        Some(StorageRecommendation {
            container_id: container_id.to_string(),
            size_gb: round2(size_gb),
            monthly_cost: round2(monthly_cost),
            issue: format!(
                "{} objects older than {} days",
                aged.count, self.config.aged_object_days
            ),
            aged_object_count: aged.count,
            aged_size_bytes: aged.size_bytes,
            recommendation: "Move to Glacier or delete old objects".to_string(),
            savings: aged.estimated_savings,
        })
    }
}
