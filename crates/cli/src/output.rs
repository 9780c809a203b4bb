//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Output format for the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log line format on stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Format bytes as human-readable string. Negative amounts keep their sign.
pub fn format_bytes(bytes: i64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();

    if magnitude >= GB {
        format!("{}{:.2}Gi", sign, magnitude as f64 / GB as f64)
    } else if magnitude >= MB {
        format!("{}{:.2}Mi", sign, magnitude as f64 / MB as f64)
    } else if magnitude >= KB {
        format!("{}{:.2}Ki", sign, magnitude as f64 / KB as f64)
    } else {
        format!("{}{}B", sign, magnitude)
    }
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores.unsigned_abs() >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Color a usage percentage by how close the node is to full
pub fn color_percent(percent: f64) -> String {
    let formatted = format_percent(percent);
    if percent >= 90.0 {
        formatted.red().to_string()
    } else if percent >= 70.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color a replica count: zero is highlighted
pub fn color_replicas(replicas: u64) -> String {
    if replicas == 0 {
        replicas.to_string().red().to_string()
    } else {
        replicas.to_string().green().to_string()
    }
}
