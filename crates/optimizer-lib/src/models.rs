//! Core data models for the cost optimizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One hourly utilization datapoint for a compute resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub timestamp: DateTime<Utc>,
    pub average_percent: f64,
}

/// A running compute instance discovered in the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResource {
    pub id: String,
    pub size_class: String,
    pub launch_time: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// An object-storage bucket discovered in the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageContainer {
    pub id: String,
}

/// One entry of a bucket's object inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a bucket's object inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<StorageObject>,
    /// Continuation token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Machine-checkable action attached to a compute recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputeAction {
    Terminate,
    Downsize { target: String },
    Monitor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRecommendation {
    #[serde(rename = "instance_id")]
    pub resource_id: String,
    #[serde(rename = "instance_type")]
    pub size_class: String,
    #[serde(rename = "avg_cpu_7d")]
    pub avg_utilization: f64,
    pub monthly_cost: f64,
    pub annual_cost: f64,
    pub action: ComputeAction,
    pub recommendation: String,
    pub reasoning: String,
    /// Annual savings, unrounded so report totals stay exact
    #[serde(rename = "potential_savings")]
    pub savings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub launch_time: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecommendation {
    #[serde(rename = "bucket")]
    pub container_id: String,
    pub size_gb: f64,
    pub monthly_cost: f64,
    pub issue: String,
    pub aged_object_count: u64,
    pub aged_size_bytes: u64,
    pub recommendation: String,
    #[serde(rename = "potential_savings")]
    pub savings: f64,
}

/// Account spend over the billing lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    #[serde(rename = "total_30day_cost")]
    pub total_cost: f64,
    pub costs_by_service: BTreeMap<String, f64>,
    pub period_days: u32,
}

impl BillingSummary {
    pub fn from_services(costs_by_service: BTreeMap<String, f64>, period_days: u32) -> Self {
        let total_cost = costs_by_service.values().fold(0.0, |acc, cost| acc + cost);
        Self {
            total_cost,
            costs_by_service,
            period_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSection {
    Compute,
    Storage,
    Billing,
}

/// Marks a report section that could not be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionError {
    pub section: ReportSection,
    pub message: String,
}

/// Serialized shape of a [`CostReport`]
#[derive(Serialize, Deserialize)]
struct CostReportRepr {
    analysis_id: String,
    region: String,
    timestamp: DateTime<Utc>,
    total_potential_savings: f64,
    ec2_recommendations: Vec<ComputeRecommendation>,
    storage_recommendations: Vec<StorageRecommendation>,
    cost_summary: Option<BillingSummary>,
    #[serde(default)]
    errors: Vec<SectionError>,
}

/// Result of one analysis run.
///
/// The total potential savings is derived from the recommendations on
/// construction and again on deserialization, so it can never disagree
/// with the per-recommendation figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CostReportRepr", from = "CostReportRepr")]
pub struct CostReport {
    analysis_id: String,
    region: String,
    timestamp: DateTime<Utc>,
    compute: Vec<ComputeRecommendation>,
    storage: Vec<StorageRecommendation>,
    cost_summary: Option<BillingSummary>,
    errors: Vec<SectionError>,
    total_potential_savings: f64,
}

impl CostReport {
    pub fn new(
        analysis_id: impl Into<String>,
        region: impl Into<String>,
        timestamp: DateTime<Utc>,
        compute: Vec<ComputeRecommendation>,
        storage: Vec<StorageRecommendation>,
        cost_summary: Option<BillingSummary>,
        errors: Vec<SectionError>,
    ) -> Self {
        let total_potential_savings = compute.iter().fold(0.0, |acc, r| acc + r.savings)
            + storage.iter().fold(0.0, |acc, r| acc + r.savings);

        Self {
            analysis_id: analysis_id.into(),
            region: region.into(),
            timestamp,
            compute,
            storage,
            cost_summary,
            errors,
            total_potential_savings,
        }
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Compute recommendations, most expensive first
    pub fn compute_recommendations(&self) -> &[ComputeRecommendation] {
        &self.compute
    }

    pub fn storage_recommendations(&self) -> &[StorageRecommendation] {
        &self.storage
    }

    pub fn cost_summary(&self) -> Option<&BillingSummary> {
        self.cost_summary.as_ref()
    }

    pub fn errors(&self) -> &[SectionError] {
        &self.errors
    }

    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_potential_savings(&self) -> f64 {
        self.total_potential_savings
    }
}

impl From<CostReport> for CostReportRepr {
    fn from(report: CostReport) -> Self {
        Self {
            analysis_id: report.analysis_id,
            region: report.region,
            timestamp: report.timestamp,
            total_potential_savings: report.total_potential_savings,
            ec2_recommendations: report.compute,
            storage_recommendations: report.storage,
            cost_summary: report.cost_summary,
            errors: report.errors,
        }
    }
}

impl From<CostReportRepr> for CostReport {
    fn from(repr: CostReportRepr) -> Self {
        // The stored total is ignored and recomputed
        CostReport::new(
            repr.analysis_id,
            repr.region,
            repr.timestamp,
            repr.ec2_recommendations,
            repr.storage_recommendations,
            repr.cost_summary,
            repr.errors,
        )
    }
}

/// Round a display value to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
