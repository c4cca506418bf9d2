//! Compute instance rightsizing rule

use super::RuleConfig;
use crate::models::{round2, ComputeAction, ComputeRecommendation, ComputeResource, UtilizationSample};
use crate::pricing::{DownsizeTable, PriceTable, HOURS_PER_MONTH, MONTHS_PER_YEAR};
use std::sync::Arc;

/// Arithmetic mean of a utilization window, `None` for an empty window
pub fn average_utilization(samples: &[UtilizationSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|s| s.average_percent).sum();
    Some(total / samples.len() as f64)
}

/// Classification of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeVerdict {
    pub action: ComputeAction,
    pub recommendation: String,
    pub reasoning: String,
    /// Annual savings of taking the action
    pub savings: f64,
    /// Set when the downsize target is not cheaper than the current class
    pub warning: Option<String>,
}

impl ComputeVerdict {
    fn monitor() -> Self {
        Self {
            action: ComputeAction::Monitor,
            recommendation: "Monitor".to_string(),
            reasoning: "Instance usage is normal".to_string(),
            savings: 0.0,
            warning: None,
        }
    }
}

/// Classifies instances into terminate / downsize / monitor
#[derive(Debug, Clone)]
pub struct ComputeRule {
    config: RuleConfig,
    prices: Arc<PriceTable>,
    downsizes: Arc<DownsizeTable>,
}

impl ComputeRule {
    pub fn new(config: RuleConfig, prices: Arc<PriceTable>, downsizes: Arc<DownsizeTable>) -> Self {
        Self {
            config,
            prices,
            downsizes,
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Classify a size class at the given average utilization.
    ///
    /// First match wins: idle instances are terminated, lightly used ones
    /// are downsized when the downsize table lists a target, everything
    /// else is monitored.
    pub fn evaluate(&self, size_class: &str, avg_utilization: f64) -> ComputeVerdict {
        let current = self.prices.hourly(size_class);

        if avg_utilization < self.config.idle_threshold {
            return ComputeVerdict {
                action: ComputeAction::Terminate,
                recommendation: "Terminate instance".to_string(),
                reasoning: format!(
                    "Instance is essentially idle (<{}% CPU)",
                    self.config.idle_threshold
                ),
                savings: current * HOURS_PER_MONTH * MONTHS_PER_YEAR,
                warning: None,
            };
        }

        if avg_utilization < self.config.downsize_threshold {
            let Some(target) = self.downsizes.resolve(size_class) else {
                return ComputeVerdict::monitor();
            };

            // A target missing from the price table is priced at half the
            // current class, not at the table's fallback price
            let target_price = self.prices.get(target).unwrap_or(current * 0.5);
            let savings = (current - target_price) * HOURS_PER_MONTH * MONTHS_PER_YEAR;

            let warning = (target_price >= current).then(|| {
                format!(
                    "Downsize target {} is not cheaper than {} ({:.4}/h vs {:.4}/h)",
                    target, size_class, target_price, current
                )
            });

            return ComputeVerdict {
                action: ComputeAction::Downsize {
                    target: target.to_string(),
                },
                recommendation: format!("Downsize to {}", target),
                reasoning: format!(
                    "Current usage ({:.1}% CPU) can be handled by smaller instance",
                    avg_utilization
                ),
                savings,
                warning,
            };
        }

        ComputeVerdict::monitor()
    }

    /// Build a recommendation for an instance from its utilization window.
    ///
    /// Returns `None` when the window holds no samples.
    pub fn recommend(
        &self,
        resource: &ComputeResource,
        samples: &[UtilizationSample],
    ) -> Option<ComputeRecommendation> {
        let avg = average_utilization(samples)?;
        let verdict = self.evaluate(&resource.size_class, avg);

        let monthly_cost = self.prices.monthly(&resource.size_class);
        let annual_cost = monthly_cost * MONTHS_PER_YEAR;

        Some(ComputeRecommendation {
            resource_id: resource.id.clone(),
            size_class: resource.size_class.clone(),
            avg_utilization: round2(avg),
            monthly_cost: round2(monthly_cost),
            annual_cost: round2(annual_cost),
            action: verdict.action,
            recommendation: verdict.recommendation,
            reasoning: verdict.reasoning,
            savings: verdict.savings,
            warning: verdict.warning,
            launch_time: resource.launch_time,
            tags: resource.tags.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn rule() -> ComputeRule {
        ComputeRule::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::reference()),
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn samples(values: &[f64]) -> Vec<UtilizationSample> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| UtilizationSample {
                timestamp: start + Duration::hours(i as i64),
                average_percent: *v,
            })
            .collect()
    }

    #[test]
    fn test_idle_instance_is_terminated() {
        let verdict = rule().evaluate("m5.xlarge", 3.0);
        assert_eq!(verdict.action, ComputeAction::Terminate);
        assert_eq!(verdict.recommendation, "Terminate instance");
        assert_close(verdict.savings, 1681.92);
    }

    #[test]
    fn test_terminate_savings_is_full_annual_price() {
        let rule = rule();
        for u in [0.0, 1.0, 2.5, 4.99] {
            for class in ["t2.micro", "t3.medium", "m5.large", "unknown.class"] {
                let verdict = rule.evaluate(class, u);
                assert_eq!(verdict.action, ComputeAction::Terminate);
                assert_close(verdict.savings, rule.prices().hourly(class) * 8760.0);
            }
        }
    }

    #[test]
    fn test_lightly_used_instance_is_downsized() {
        let verdict = rule().evaluate("t3.medium", 10.0);
        assert_eq!(
            verdict.action,
            ComputeAction::Downsize {
                target: "t3.small".to_string()
            }
        );
        assert_eq!(verdict.recommendation, "Downsize to t3.small");
        assert_close(verdict.savings, 182.208);
        assert!(verdict.warning.is_none());
    }

    #[test]
    fn test_downsize_boundaries() {
        let rule = rule();
        assert!(matches!(
            rule.evaluate("m5.xlarge", 5.0).action,
            ComputeAction::Downsize { .. }
        ));
        assert!(matches!(
            rule.evaluate("m5.xlarge", 14.99).action,
            ComputeAction::Downsize { .. }
        ));
        assert_eq!(rule.evaluate("m5.xlarge", 15.0).action, ComputeAction::Monitor);
    }

    #[test]
    fn test_downsize_without_target_monitors() {
        let verdict = rule().evaluate("t2.micro", 10.0);
        assert_eq!(verdict.action, ComputeAction::Monitor);
        assert_eq!(verdict.savings, 0.0);
    }

    #[test]
    fn test_downsize_target_missing_price_is_half_current() {
        // t3.micro is not in the reference price table
        let verdict = rule().evaluate("t3.small", 8.0);
        assert_close(verdict.savings, 0.0104 * 8760.0);
    }

    #[test]
    fn test_downsize_to_same_class_is_flagged() {
        let verdict = rule().evaluate("m5.large", 10.0);
        assert_eq!(
            verdict.action,
            ComputeAction::Downsize {
                target: "m5.large".to_string()
            }
        );
        assert_eq!(verdict.savings, 0.0);
        assert!(verdict.warning.is_some());
    }

    #[test]
    fn test_downsize_to_pricier_class_reports_negative_savings() {
        let mut downsizes = std::collections::HashMap::new();
        downsizes.insert("t3.small".to_string(), "t3.medium".to_string());
        let rule = ComputeRule::new(
            RuleConfig::default(),
            Arc::new(PriceTable::default()),
            Arc::new(DownsizeTable::new(downsizes)),
        );

        let verdict = rule.evaluate("t3.small", 10.0);
        assert!(verdict.savings < 0.0);
        assert_close(verdict.savings, (0.0208 - 0.0416) * 8760.0);
        assert!(verdict.warning.is_some());
    }

    #[test]
    fn test_busy_instance_is_monitored() {
        let rule = rule();
        for u in [15.0, 42.0, 100.0] {
            let verdict = rule.evaluate("m5.xlarge", u);
            assert_eq!(verdict.action, ComputeAction::Monitor);
            assert_eq!(verdict.savings, 0.0);
        }
    }

    #[test]
    fn test_average_utilization() {
        assert_eq!(average_utilization(&[]), None);
        assert_eq!(average_utilization(&samples(&[2.0, 4.0, 6.0])), Some(4.0));
    }

    #[test]
    fn test_recommend_skips_empty_window() {
        let resource = ComputeResource {
            id: "i-0abc".to_string(),
            size_class: "m5.xlarge".to_string(),
            launch_time: Utc::now(),
            tags: Default::default(),
        };
        assert!(rule().recommend(&resource, &[]).is_none());
    }

    #[test]
    fn test_recommend_reports_costs() {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("team".to_string(), "data".to_string());
        let resource = ComputeResource {
            id: "i-0abc".to_string(),
            size_class: "m5.xlarge".to_string(),
            launch_time: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            tags,
        };

        let rec = rule()
            .recommend(&resource, &samples(&[40.0, 50.0, 60.0]))
            .unwrap();
        assert_eq!(rec.avg_utilization, 50.0);
        assert_eq!(rec.monthly_cost, 140.16);
        assert_eq!(rec.annual_cost, 1681.92);
        assert_eq!(rec.action, ComputeAction::Monitor);
        assert_eq!(rec.savings, 0.0);
        assert_eq!(rec.tags["team"], "data");
    }
}
