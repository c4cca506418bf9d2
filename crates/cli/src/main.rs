//! Cloud cost optimizer CLI
//!
//! A command-line tool for running account analyses, fetching stored
//! reports and analyzing snapshot files offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, health, report};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Cloud cost optimizer CLI
#[derive(Parser)]
#[command(name = "cloudopt")]
#[command(author, version, about = "CLI for the Cloud Cost Optimizer", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CLOUDOPT_API_URL env var)
    #[arg(long, env = "CLOUDOPT_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze an AWS account through the API
    Analyze {
        /// Access key ID
        #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
        access_key: String,

        /// Secret access key
        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        secret_key: String,

        /// Region to analyze
        #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
        region: String,
    },

    /// Fetch a stored report by analysis ID
    Report {
        /// Analysis ID returned by `analyze`
        id: String,
    },

    /// Check that the API is up
    Health,

    /// Analyze an account snapshot file without a server
    Local {
        /// Snapshot JSON file
        snapshot: PathBuf,

        /// Region label for the report
        #[arg(long, default_value = "local")]
        region: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli.format.unwrap_or_else(|| config.format());
    let api_url = cli
        .api_url
        .or(config.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Analyze {
            access_key,
            secret_key,
            region,
        } => {
            let client = client::ApiClient::new(&api_url)?;
            analyze::run_analysis(&client, access_key, secret_key, region, format).await?;
        }
        Commands::Report { id } => {
            let client = client::ApiClient::new(&api_url)?;
            report::show_report(&client, &id, format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&api_url)?;
            health::show_health(&client, format).await?;
        }
        Commands::Local { snapshot, region } => {
            analyze::run_local(&snapshot, &region, format).await?;
        }
    }

    Ok(())
}
