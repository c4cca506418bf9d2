//! API client for communicating with the optimizer API

use anyhow::{Context, Result};
use optimizer_lib::CostReport;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// An analysis may take as long as the server's own request timeout
const REQUEST_TIMEOUT_SECS: u64 = 180;

/// API client for the optimizer API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Run an analysis for the given credentials
    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<CostReport> {
        self.post("api/analyze", request).await
    }

    /// Fetch a stored report
    pub async fn report(&self, analysis_id: &str) -> Result<CostReport> {
        self.get(&format!("api/analysis/{}", analysis_id)).await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.get("api/health").await
    }
}

// API request and response types

#[derive(Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub aws_region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
