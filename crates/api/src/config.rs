//! Service configuration

use anyhow::{Context, Result};
use optimizer_lib::{AnalyzerConfig, PricingConfig, RuleConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "OPTIMIZER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "optimizer.toml";
const ENV_PREFIX: &str = "OPTIMIZER";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Origins allowed by CORS; `*` allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Upper bound on one analysis request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub rules: RuleConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Account data read from a JSON snapshot file
    Snapshot,
    /// Live AWS APIs
    Aws,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,

    /// Report directory for the file store
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            dir: default_store_dir(),
        }
    }
}

fn default_api_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_request_timeout() -> u64 {
    120
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Snapshot
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("snapshot.json")
}

fn default_store_kind() -> StoreKind {
    StoreKind::Memory
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cors_origins: default_cors_origins(),
            request_timeout_secs: default_request_timeout(),
            provider: ProviderConfig::default(),
            store: StoreConfig::default(),
            pricing: PricingConfig::default(),
            rules: RuleConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path), environment())
    }

    /// Layer `env` over the file at `path`; a missing file is not an error
    pub fn load_from(path: &Path, env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Invalid service configuration")
    }
}

/// `OPTIMIZER_API_PORT`, `OPTIMIZER_STORE__KIND`, ...
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cors_origins")
        .try_parsing(true)
}
