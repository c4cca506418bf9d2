//! AWS provider
//!
//! EC2 for instance inventory, CloudWatch for CPU and bucket size metrics,
//! S3 for object inventories and Cost Explorer for billing totals.

use super::{async_trait, Credentials, MetricsProvider, ProviderFactory, ProviderResult};
use crate::error::ProviderError;
use crate::models::{
    ComputeResource, ObjectPage, StorageContainer, StorageObject, UtilizationSample,
};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatch::types::{Dimension, Statistic};
use aws_sdk_costexplorer::types::{DateInterval, Granularity, GroupDefinition, GroupDefinitionType};
use aws_sdk_ec2::types::Filter;
use aws_sdk_s3::config::Credentials as AwsCredentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_smithy_types::DateTime as SmithyDateTime;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Error codes that mean the credentials were rejected
const AUTH_ERROR_CODES: &[&str] = &[
    "AuthFailure",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "InvalidAccessKeyId",
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "ExpiredToken",
];

/// Map an SDK error onto the provider error taxonomy
fn classify<E>(err: E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = format!("{}", DisplayErrorContext(&err));
    match err.code() {
        Some(code) if AUTH_ERROR_CODES.contains(&code) => ProviderError::Auth(message),
        Some(_) => ProviderError::Request(message),
        None => ProviderError::Unavailable(message),
    }
}

fn to_smithy(ts: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs(ts.timestamp())
}

fn to_chrono(ts: &SmithyDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts.secs(), ts.subsec_nanos()).single()
}

pub struct AwsProvider {
    ec2: aws_sdk_ec2::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    s3: aws_sdk_s3::Client,
    cost_explorer: aws_sdk_costexplorer::Client,
}

impl AwsProvider {
    pub async fn connect(credentials: &Credentials) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(AwsCredentials::new(
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                None,
                None,
                "cloud-optimizer",
            ))
            .load()
            .await;

        Self {
            ec2: aws_sdk_ec2::Client::new(&shared),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&shared),
            s3: aws_sdk_s3::Client::new(&shared),
            cost_explorer: aws_sdk_costexplorer::Client::new(&shared),
        }
    }

    fn dimension(name: &str, value: &str) -> ProviderResult<Dimension> {
        Dimension::builder()
            .name(name)
            .value(value)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))
    }
}

#[async_trait]
impl MetricsProvider for AwsProvider {
    async fn list_compute_resources(&self) -> ProviderResult<Vec<ComputeResource>> {
        let mut resources = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .ec2
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .values("running")
                        .build(),
                )
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;

            for reservation in output.reservations() {
                for instance in reservation.instances() {
                    let Some(id) = instance.instance_id() else {
                        continue;
                    };
                    let size_class = instance
                        .instance_type()
                        .map(|t| t.as_str().to_string())
                        .unwrap_or_default();
                    let launch_time = instance
                        .launch_time()
                        .and_then(to_chrono)
                        .unwrap_or_else(Utc::now);
                    let tags = instance
                        .tags()
                        .iter()
                        .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
                        .collect();

                    resources.push(ComputeResource {
                        id: id.to_string(),
                        size_class,
                        launch_time,
                        tags,
                    });
                }
            }

            match output.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(count = resources.len(), "Listed running EC2 instances");
        Ok(resources)
    }

    async fn get_utilization(
        &self,
        resource_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_secs: i32,
    ) -> ProviderResult<Vec<UtilizationSample>> {
        let output = self
            .cloudwatch
            .get_metric_statistics()
            .namespace("AWS/EC2")
            .metric_name("CPUUtilization")
            .dimensions(Self::dimension("InstanceId", resource_id)?)
            .start_time(to_smithy(start))
            .end_time(to_smithy(end))
            .period(period_secs)
            .statistics(Statistic::Average)
            .send()
            .await
            .map_err(classify)?;

        Ok(output
            .datapoints()
            .iter()
            .filter_map(|dp| {
                Some(UtilizationSample {
                    timestamp: dp.timestamp().and_then(to_chrono)?,
                    average_percent: dp.average()?,
                })
            })
            .collect())
    }

    async fn list_storage_containers(&self) -> ProviderResult<Vec<StorageContainer>> {
        let output = self.s3.list_buckets().send().await.map_err(classify)?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(|name| StorageContainer {
                id: name.to_string(),
            })
            .collect())
    }

    async fn get_container_size(&self, container_id: &str) -> ProviderResult<Option<u64>> {
        let end = Utc::now();
        let output = self
            .cloudwatch
            .get_metric_statistics()
            .namespace("AWS/S3")
            .metric_name("BucketSizeBytes")
            .dimensions(Self::dimension("BucketName", container_id)?)
            .dimensions(Self::dimension("StorageType", "StandardStorage")?)
            .start_time(to_smithy(end - Duration::days(1)))
            .end_time(to_smithy(end))
            .period(86_400)
            .statistics(Statistic::Average)
            .send()
            .await
            .map_err(classify)?;

        Ok(output
            .datapoints()
            .iter()
            .filter_map(|dp| dp.average())
            .next()
            .map(|bytes| bytes.max(0.0) as u64))
    }

    async fn list_objects(
        &self,
        container_id: &str,
        continuation: Option<&str>,
    ) -> ProviderResult<ObjectPage> {
        let output = self
            .s3
            .list_objects_v2()
            .bucket(container_id)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(classify)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                Some(StorageObject {
                    key: o.key().unwrap_or_default().to_string(),
                    size_bytes: o.size().unwrap_or(0).max(0) as u64,
                    last_modified: o.last_modified().and_then(to_chrono)?,
                })
            })
            .collect();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn get_billing_summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProviderResult<BTreeMap<String, f64>> {
        let period = DateInterval::builder()
            .start(start.format("%Y-%m-%d").to_string())
            .end(end.format("%Y-%m-%d").to_string())
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let output = self
            .cost_explorer
            .get_cost_and_usage()
            .time_period(period)
            .granularity(Granularity::Monthly)
            .metrics("UnblendedCost")
            .group_by(
                GroupDefinition::builder()
                    .r#type(GroupDefinitionType::Dimension)
                    .key("SERVICE")
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;

        let mut costs = BTreeMap::new();
        for result in output.results_by_time() {
            for group in result.groups() {
                let Some(service) = group.keys().first() else {
                    continue;
                };
                let amount = group
                    .metrics()
                    .and_then(|m| m.get("UnblendedCost"))
                    .and_then(|v| v.amount())
                    .and_then(|a| a.parse::<f64>().ok())
                    .unwrap_or(0.0);
                *costs.entry(service.clone()).or_insert(0.0) += amount;
            }
        }

        Ok(costs)
    }
}

/// Builds an [`AwsProvider`] from each request's credentials
#[derive(Debug, Clone, Default)]
pub struct AwsProviderFactory;

#[async_trait]
impl ProviderFactory for AwsProviderFactory {
    async fn connect(&self, credentials: &Credentials) -> ProviderResult<Arc<dyn MetricsProvider>> {
        credentials.validate()?;
        Ok(Arc::new(AwsProvider::connect(credentials).await))
    }

    fn name(&self) -> &'static str {
        "aws"
    }
}
