//! Report rendering

use anyhow::Result;
use colored::Colorize;
use optimizer_lib::CostReport;
use tabled::{settings::Style, Table, Tabled};

use crate::client::ApiClient;
use crate::output::{
    color_action, format_bytes, format_currency, format_percent, print_info, print_json,
    print_warning, OutputFormat,
};

/// Row for the compute recommendations table
#[derive(Tabled)]
struct ComputeRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Type")]
    size_class: String,
    #[tabled(rename = "Avg CPU (7d)")]
    avg_cpu: String,
    #[tabled(rename = "Monthly")]
    monthly_cost: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Savings/yr")]
    savings: String,
}

/// Row for the storage recommendations table
#[derive(Tabled)]
struct StorageRow {
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Size (GB)")]
    size_gb: String,
    #[tabled(rename = "Aged Objects")]
    aged_objects: String,
    #[tabled(rename = "Aged Size")]
    aged_size: String,
    #[tabled(rename = "Savings/yr")]
    savings: String,
}

/// Row for the billing breakdown table
#[derive(Tabled)]
struct ServiceCostRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

/// Fetch a stored report and print it
pub async fn show_report(client: &ApiClient, analysis_id: &str, format: OutputFormat) -> Result<()> {
    let report = client.report(analysis_id).await?;
    print_report(&report, format)
}

/// Print a report in the requested format
pub fn print_report(report: &CostReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Table => print_report_table(report),
    }
    Ok(())
}

fn print_report_table(report: &CostReport) {
    println!("{}", "Cost Optimization Report".bold());
    println!("{}", "=".repeat(60));
    println!("Analysis ID:  {}", report.analysis_id().cyan());
    println!("Region:       {}", report.region());
    println!(
        "Generated:    {}",
        report.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    for error in report.errors() {
        print_warning(&format!(
            "{:?} section unavailable: {}",
            error.section, error.message
        ));
    }

    println!("{}", "EC2 Instances".bold());
    println!("{}", "-".repeat(60));
    if report.compute_recommendations().is_empty() {
        print_info("No instance recommendations");
    } else {
        let rows: Vec<ComputeRow> = report
            .compute_recommendations()
            .iter()
            .map(|r| ComputeRow {
                instance: r.resource_id.clone(),
                size_class: r.size_class.clone(),
                avg_cpu: format_percent(r.avg_utilization),
                monthly_cost: format_currency(r.monthly_cost),
                action: color_action(&r.action),
                savings: format_currency(r.savings),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()).to_string());

        for r in report.compute_recommendations() {
            if let Some(warning) = &r.warning {
                print_warning(&format!("{}: {}", r.resource_id, warning));
            }
        }
    }
    println!();

    println!("{}", "S3 Buckets".bold());
    println!("{}", "-".repeat(60));
    if report.storage_recommendations().is_empty() {
        print_info("No buckets with aged objects");
    } else {
        let rows: Vec<StorageRow> = report
            .storage_recommendations()
            .iter()
            .map(|r| StorageRow {
                bucket: r.container_id.clone(),
                size_gb: format!("{:.2}", r.size_gb),
                aged_objects: r.aged_object_count.to_string(),
                aged_size: format_bytes(r.aged_size_bytes),
                savings: format_currency(r.savings),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()).to_string());
    }
    println!();

    if let Some(summary) = report.cost_summary() {
        println!(
            "{} ({} days)",
            "Billing".bold(),
            summary.period_days
        );
        println!("{}", "-".repeat(60));
        let rows: Vec<ServiceCostRow> = summary
            .costs_by_service
            .iter()
            .map(|(service, cost)| ServiceCostRow {
                service: service.clone(),
                cost: format_currency(*cost),
            })
            .collect();
        if !rows.is_empty() {
            println!("{}", Table::new(rows).with(Style::rounded()).to_string());
        }
        println!("Total:        {}", format_currency(summary.total_cost));
        println!();
    }

    println!(
        "{}  {}",
        "Total Potential Savings:".bold(),
        format_currency(report.total_potential_savings())
            .green()
            .bold()
    );
}
