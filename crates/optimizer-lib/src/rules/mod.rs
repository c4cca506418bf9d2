//! Recommendation rules
//!
//! Pure classifiers that turn utilization and object-age metrics into
//! categorized, quantified savings recommendations.

mod compute;
mod storage;

pub use compute::{average_utilization, ComputeRule, ComputeVerdict};
pub use storage::{AgedObjectSummary, AgedObjectTally, StorageRule, BYTES_PER_GB};

use crate::error::OptimizerError;
use serde::Deserialize;

/// Average utilization below which an instance is considered idle
pub const DEFAULT_IDLE_THRESHOLD: f64 = 5.0;

/// Average utilization below which an instance is a downsizing candidate
pub const DEFAULT_DOWNSIZE_THRESHOLD: f64 = 15.0;

/// Objects not modified for this many days are considered aged
pub const DEFAULT_AGED_OBJECT_DAYS: i64 = 90;

/// Standard tier price per TB-month
pub const DEFAULT_STANDARD_TB_MONTH: f64 = 23.0;

/// Archival tier price per TB-month
pub const DEFAULT_ARCHIVAL_TB_MONTH: f64 = 4.0;

/// Longest accepted lookback window, about a century
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Thresholds, tier rates and lookback windows used by the rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub idle_threshold: f64,
    pub downsize_threshold: f64,
    pub aged_object_days: i64,
    pub standard_tb_month: f64,
    pub archival_tb_month: f64,
    /// Trailing utilization window in days
    pub utilization_window_days: i64,
    /// Sampling period of the utilization window in seconds
    pub utilization_period_secs: i32,
    /// Billing lookback in days
    pub billing_window_days: u32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            downsize_threshold: DEFAULT_DOWNSIZE_THRESHOLD,
            aged_object_days: DEFAULT_AGED_OBJECT_DAYS,
            standard_tb_month: DEFAULT_STANDARD_TB_MONTH,
            archival_tb_month: DEFAULT_ARCHIVAL_TB_MONTH,
            utilization_window_days: 7,
            utilization_period_secs: 3600,
            billing_window_days: 30,
        }
    }
}

impl RuleConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let fail = |msg: String| Err(OptimizerError::Config(msg));

        if !(0.0..=100.0).contains(&self.idle_threshold)
            || !(0.0..=100.0).contains(&self.downsize_threshold)
        {
            return fail("utilization thresholds must be between 0 and 100".to_string());
        }
        if self.idle_threshold > self.downsize_threshold {
            return fail(format!(
                "idle_threshold ({}) exceeds downsize_threshold ({})",
                self.idle_threshold, self.downsize_threshold
            ));
        }
        let windows = [
            ("aged_object_days", self.aged_object_days),
            ("utilization_window_days", self.utilization_window_days),
            ("billing_window_days", i64::from(self.billing_window_days)),
        ];
        for (name, days) in windows {
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return fail(format!(
                    "{} must be between 1 and {} days, got {}",
                    name, MAX_WINDOW_DAYS, days
                ));
            }
        }
        if self.utilization_period_secs <= 0 {
            return fail("utilization_period_secs must be positive".to_string());
        }

        for (name, rate) in [
            ("standard_tb_month", self.standard_tb_month),
            ("archival_tb_month", self.archival_tb_month),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return fail(format!("{} must be a non-negative number, got {}", name, rate));
            }
        }
        if self.archival_tb_month > self.standard_tb_month {
            return fail(format!(
                "archival_tb_month ({}) exceeds standard_tb_month ({})",
                self.archival_tb_month, self.standard_tb_month
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        assert!(RuleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let rules = RuleConfig {
            idle_threshold: 20.0,
            ..RuleConfig::default()
        };
        assert!(matches!(rules.validate(), Err(OptimizerError::Config(_))));
    }

    #[test]
    fn test_empty_window_rejected() {
        let rules = RuleConfig {
            utilization_window_days: 0,
            ..RuleConfig::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let rules = RuleConfig {
            aged_object_days: 100_000_000,
            ..RuleConfig::default()
        };
        assert!(matches!(rules.validate(), Err(OptimizerError::Config(_))));

        let rules = RuleConfig {
            utilization_window_days: MAX_WINDOW_DAYS + 1,
            ..RuleConfig::default()
        };
        assert!(rules.validate().is_err());

        let rules = RuleConfig {
            aged_object_days: MAX_WINDOW_DAYS,
            ..RuleConfig::default()
        };
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_non_finite_tier_rates_rejected() {
        for rate in [f64::NAN, f64::INFINITY, -1.0] {
            let rules = RuleConfig {
                standard_tb_month: rate,
                ..RuleConfig::default()
            };
            assert!(rules.validate().is_err(), "standard rate {} accepted", rate);

            let rules = RuleConfig {
                archival_tb_month: rate,
                ..RuleConfig::default()
            };
            assert!(rules.validate().is_err(), "archival rate {} accepted", rate);
        }
    }

    #[test]
    fn test_archival_above_standard_rejected() {
        let rules = RuleConfig {
            standard_tb_month: 4.0,
            archival_tb_month: 23.0,
            ..RuleConfig::default()
        };
        assert!(rules.validate().is_err());
    }
}
