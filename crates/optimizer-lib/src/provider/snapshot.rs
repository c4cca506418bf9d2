//! Provider backed by a JSON account snapshot
//!
//! Serves a previously exported view of an account: instances with their
//! utilization samples, buckets with size and object inventory, and billing
//! totals. Used for offline analysis and tests.

use super::{async_trait, Credentials, MetricsProvider, ProviderFactory, ProviderResult};
use crate::error::ProviderError;
use crate::models::{
    ComputeResource, ObjectPage, StorageContainer, StorageObject, UtilizationSample,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Objects per inventory page, matching the S3 listing default
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub instances: Vec<InstanceSnapshot>,
    #[serde(default)]
    pub buckets: Vec<BucketSnapshot>,
    /// Cost per service over the billing window
    #[serde(default)]
    pub billing: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    #[serde(flatten)]
    pub resource: ComputeResource,
    #[serde(default)]
    pub samples: Vec<UtilizationSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub name: String,
    /// Missing when the bucket has no size datapoint
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub objects: Vec<StorageObject>,
}

#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    snapshot: AccountSnapshot,
    page_size: usize,
}

impl SnapshotProvider {
    pub fn new(snapshot: AccountSnapshot) -> Self {
        Self {
            snapshot,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Load a snapshot from a JSON file
    pub async fn from_file(path: &Path) -> ProviderResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProviderError::Unavailable(format!("cannot read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: AccountSnapshot = serde_json::from_str(&content).map_err(|e| {
            ProviderError::Request(format!("invalid snapshot {}: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            instances = snapshot.instances.len(),
            buckets = snapshot.buckets.len(),
            "Loaded account snapshot"
        );

        Ok(Self::new(snapshot))
    }

    fn instance(&self, resource_id: &str) -> ProviderResult<&InstanceSnapshot> {
        self.snapshot
            .instances
            .iter()
            .find(|i| i.resource.id == resource_id)
            .ok_or_else(|| ProviderError::Request(format!("unknown instance {}", resource_id)))
    }

    fn bucket(&self, container_id: &str) -> ProviderResult<&BucketSnapshot> {
        self.snapshot
            .buckets
            .iter()
            .find(|b| b.name == container_id)
            .ok_or_else(|| ProviderError::Request(format!("unknown bucket {}", container_id)))
    }
}

#[async_trait]
impl MetricsProvider for SnapshotProvider {
    async fn list_compute_resources(&self) -> ProviderResult<Vec<ComputeResource>> {
        Ok(self
            .snapshot
            .instances
            .iter()
            .map(|i| i.resource.clone())
            .collect())
    }

    async fn get_utilization(
        &self,
        resource_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _period_secs: i32,
    ) -> ProviderResult<Vec<UtilizationSample>> {
        let instance = self.instance(resource_id)?;
        Ok(instance
            .samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .copied()
            .collect())
    }

    async fn list_storage_containers(&self) -> ProviderResult<Vec<StorageContainer>> {
        Ok(self
            .snapshot
            .buckets
            .iter()
            .map(|b| StorageContainer { id: b.name.clone() })
            .collect())
    }

    async fn get_container_size(&self, container_id: &str) -> ProviderResult<Option<u64>> {
        Ok(self.bucket(container_id)?.size_bytes)
    }

    async fn list_objects(
        &self,
        container_id: &str,
        continuation: Option<&str>,
    ) -> ProviderResult<ObjectPage> {
        let bucket = self.bucket(container_id)?;

        let offset = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProviderError::Request(format!("invalid continuation token {:?}", token))
            })?,
            None => 0,
        };

        let end = (offset + self.page_size).min(bucket.objects.len());
        let objects = bucket
            .objects
            .get(offset..end)
            .map(<[StorageObject]>::to_vec)
            .unwrap_or_default();
        let next_token = (end < bucket.objects.len()).then(|| end.to_string());

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn get_billing_summary(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> ProviderResult<BTreeMap<String, f64>> {
        Ok(self.snapshot.billing.clone())
    }
}

/// Serves the snapshot file at `path` for every request
#[derive(Debug, Clone)]
pub struct SnapshotProviderFactory {
    path: PathBuf,
    page_size: usize,
}

impl SnapshotProviderFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[async_trait]
impl ProviderFactory for SnapshotProviderFactory {
    async fn connect(&self, credentials: &Credentials) -> ProviderResult<Arc<dyn MetricsProvider>> {
        credentials.validate()?;
        let provider = SnapshotProvider::from_file(&self.path)
            .await?
            .with_page_size(self.page_size);
        Ok(Arc::new(provider))
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}
