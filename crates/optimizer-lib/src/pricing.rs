//! Reference pricing data
//!
//! Hourly instance prices and the instance downsizing map. Both are loaded
//! once from configuration at startup and shared read-only afterwards.

use crate::error::OptimizerError;
use serde::Deserialize;
use std::collections::HashMap;

/// Hours billed per month
pub const HOURS_PER_MONTH: f64 = 730.0;

pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Hourly price assumed for size classes missing from the price table
pub const DEFAULT_FALLBACK_HOURLY_PRICE: f64 = 0.10;

const REFERENCE_PRICES: &[(&str, f64)] = &[
    ("t2.micro", 0.0116),
    ("t2.small", 0.023),
    ("t2.medium", 0.0464),
    ("t3.small", 0.0208),
    ("t3.medium", 0.0416),
    ("m5.large", 0.096),
    ("m5.xlarge", 0.192),
];

const REFERENCE_DOWNSIZES: &[(&str, &str)] = &[
    ("m5.xlarge", "m5.large"),
    ("m5.large", "m5.large"),
    ("t3.medium", "t3.small"),
    ("t3.small", "t3.micro"),
    ("t2.large", "t2.medium"),
    ("t2.medium", "t2.small"),
];

/// Size class to hourly price, with a fallback for unknown classes
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, f64>,
    fallback: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new(reference_prices(), DEFAULT_FALLBACK_HOURLY_PRICE)
    }
}

impl PriceTable {
    pub fn new(prices: HashMap<String, f64>, fallback: f64) -> Self {
        Self { prices, fallback }
    }

    /// Listed price for a size class, if any
    pub fn get(&self, size_class: &str) -> Option<f64> {
        self.prices.get(size_class).copied()
    }

    /// Hourly price for a size class, falling back for unlisted classes
    pub fn hourly(&self, size_class: &str) -> f64 {
        self.get(size_class).unwrap_or(self.fallback)
    }

    pub fn monthly(&self, size_class: &str) -> f64 {
        self.hourly(size_class) * HOURS_PER_MONTH
    }

    pub fn annual(&self, size_class: &str) -> f64 {
        self.monthly(size_class) * MONTHS_PER_YEAR
    }
}

/// Size class to the next smaller size class.
///
/// Entries may map a class to itself; that is a terminal entry, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownsizeTable {
    next_smaller: HashMap<String, String>,
}

impl DownsizeTable {
    pub fn new(next_smaller: HashMap<String, String>) -> Self {
        Self { next_smaller }
    }

    pub fn reference() -> Self {
        Self::new(reference_downsizes())
    }

    /// Next smaller size class, `None` when no smaller option is listed
    pub fn resolve(&self, size_class: &str) -> Option<&str> {
        self.next_smaller.get(size_class).map(String::as_str)
    }
}

/// Pricing section of the service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "reference_prices")]
    pub instance_prices: HashMap<String, f64>,

    #[serde(default = "default_fallback_price")]
    pub fallback_hourly_price: f64,

    #[serde(default = "reference_downsizes")]
    pub downsize_map: HashMap<String, String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            instance_prices: reference_prices(),
            fallback_hourly_price: DEFAULT_FALLBACK_HOURLY_PRICE,
            downsize_map: reference_downsizes(),
        }
    }
}

impl PricingConfig {
    pub fn price_table(&self) -> PriceTable {
        PriceTable::new(self.instance_prices.clone(), self.fallback_hourly_price)
    }

    pub fn downsize_table(&self) -> DownsizeTable {
        DownsizeTable::new(self.downsize_map.clone())
    }

    /// Reject prices that would produce meaningless cost figures
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let valid = |price: f64| price.is_finite() && price >= 0.0;

        if !valid(self.fallback_hourly_price) {
            return Err(OptimizerError::Config(format!(
                "fallback_hourly_price must be a non-negative number, got {}",
                self.fallback_hourly_price
            )));
        }
        if let Some((class, price)) = self.instance_prices.iter().find(|(_, p)| !valid(**p)) {
            return Err(OptimizerError::Config(format!(
                "price for {} must be a non-negative number, got {}",
                class, price
            )));
        }
        Ok(())
    }
}

fn reference_prices() -> HashMap<String, f64> {
    REFERENCE_PRICES
        .iter()
        .map(|(class, price)| (class.to_string(), *price))
        .collect()
}

fn reference_downsizes() -> HashMap<String, String> {
    REFERENCE_DOWNSIZES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

fn default_fallback_price() -> f64 {
    DEFAULT_FALLBACK_HOURLY_PRICE
}
