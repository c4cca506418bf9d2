//! Error types for the optimizer engine

use thiserror::Error;

/// Failure of a single metrics provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials were rejected or missing
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider could not be reached
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but the request failed
    #[error("provider request failed: {0}")]
    Request(String),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

/// Failure of the report store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid analysis id: {0}")]
    InvalidId(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Top-level error returned by an analysis run
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Every top-level section of the report failed to load
    #[error("analysis failed: {0}")]
    AllSectionsFailed(String),
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;
