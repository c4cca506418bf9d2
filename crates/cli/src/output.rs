//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use optimizer_lib::ComputeAction;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2}Ti", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format US dollars
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

/// Format a utilization percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Short label for a compute action
pub fn action_label(action: &ComputeAction) -> String {
    match action {
        ComputeAction::Terminate => "terminate".to_string(),
        ComputeAction::Downsize { target } => format!("downsize → {}", target),
        ComputeAction::Monitor => "monitor".to_string(),
    }
}

/// Color an action label by severity
pub fn color_action(action: &ComputeAction) -> String {
    let label = action_label(action);
    match action {
        ComputeAction::Terminate => label.red().to_string(),
        ComputeAction::Downsize { .. } => label.yellow().to_string(),
        ComputeAction::Monitor => label.dimmed().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ok" | "healthy" => status.green().to_string(),
        "degraded" | "warning" => status.yellow().to_string(),
        "unhealthy" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00Ki");
        assert_eq!(format_bytes(107_374_182_400), "100.00Gi");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1681.92), "$1681.92");
        assert_eq!(format_currency(-84.1), "-$84.10");
    }

    #[test]
    fn test_action_label() {
        assert_eq!(action_label(&ComputeAction::Terminate), "terminate");
        assert_eq!(
            action_label(&ComputeAction::Downsize {
                target: "t3.small".to_string()
            }),
            "downsize → t3.small"
        );
    }
}
