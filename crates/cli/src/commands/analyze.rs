//! Analysis commands: remote through the API, or local against a snapshot

use anyhow::{Context, Result};
use chrono::Utc;
use optimizer_lib::{
    provider::SnapshotProvider, store::new_analysis_id, Analyzer, CostReport,
};
use std::path::Path;

use crate::client::{AnalyzeRequest, ApiClient};
use crate::commands::report::print_report;
use crate::output::{print_success, OutputFormat};

/// Run an analysis on the server and print the report
pub async fn run_analysis(
    client: &ApiClient,
    access_key: String,
    secret_key: String,
    region: String,
    format: OutputFormat,
) -> Result<()> {
    let request = AnalyzeRequest {
        aws_access_key: access_key,
        aws_secret_key: secret_key,
        aws_region: region,
    };

    let report = client.analyze(&request).await?;

    if matches!(format, OutputFormat::Table) {
        print_success(&format!("Analysis {} complete", report.analysis_id()));
        println!();
    }
    print_report(&report, format)
}

/// Analyze a snapshot file in-process and print the report
pub async fn run_local(snapshot: &Path, region: &str, format: OutputFormat) -> Result<()> {
    let report = analyze_snapshot(snapshot, region).await?;
    print_report(&report, format)
}

/// Analyze a snapshot file with the reference pricing and thresholds
pub async fn analyze_snapshot(snapshot: &Path, region: &str) -> Result<CostReport> {
    let provider = SnapshotProvider::from_file(snapshot)
        .await
        .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;

    let analyzer = Analyzer::with_defaults();
    let analysis_id = new_analysis_id(Utc::now());
    let report = analyzer
        .analyze(&provider, &analysis_id, region)
        .await
        .context("Analysis failed")?;
    Ok(report)
}
