//! API liveness check

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, OutputFormat};

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("API status: {}", color_status(&health.status));
            println!("Checked at: {}", health.timestamp);
        }
    }

    Ok(())
}
