//! Shared utilities for CLI commands

use chrono::{DateTime, Local};

/// Format a byte count in human-readable units
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Render a timestamp as "N <unit>s ago"
pub fn time_ago(t: DateTime<Local>) -> String {
    let elapsed = Local::now().signed_duration_since(t);

    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes} mins ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours} hours ago");
    }
    let days = elapsed.num_days();
    if days < 30 {
        return format!("{days} days ago");
    }
    format!("{} months ago", days / 30)
}
