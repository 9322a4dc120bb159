//! Table output formatting for CLI commands
//!
//! Formats analysis tasks and monitored configurations using comfy-table,
//! with color-coded status cells when the terminal supports them.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{AnalysisTask, ExecutionStatus, MonitoredConfiguration};
use crate::domain::ports::minute_to_datetime;

use super::truncate;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Format a list of analysis tasks as a table
    pub fn format_tasks(&self, tasks: &[AnalysisTask]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Type", "Level", "Status", "Config", "Minute", "Retry", "Backoff"]));

        for task in tasks {
            let id_short = &task.id.to_string()[..8];
            let status_cell = if self.use_colors {
                Cell::new(task.status.as_str()).fg(status_color(task.status))
            } else {
                Cell::new(format!("{} {}", status_icon(task.status), task.status.as_str()))
            };
            let level = task.cluster_level.map_or_else(|| "-".to_string(), |l| l.to_string());
            let attempt = if task.is_fork() {
                format!("{} (fork {})", task.retry, task.attempt)
            } else {
                task.retry.to_string()
            };

            table.add_row(vec![
                Cell::new(id_short),
                Cell::new(task.analysis_type.as_str()),
                Cell::new(level),
                status_cell,
                Cell::new(truncate(task.config_id.as_deref().unwrap_or("-"), 24)),
                Cell::new(format_minute(task.analysis_minute)),
                Cell::new(attempt),
                Cell::new(task.backoff_count.to_string()),
            ]);
        }

        table.to_string()
    }

    /// Format a list of monitored configurations as a table
    pub fn format_configurations(&self, configs: &[MonitoredConfiguration]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Account", "Kind", "Provider", "Enabled", "Baseline", "Alerts"]));

        for config in configs {
            let enabled = if config.enabled { "yes" } else { "no" };
            let enabled_cell = if self.use_colors {
                Cell::new(enabled).fg(if config.enabled { Color::Green } else { Color::DarkGrey })
            } else {
                Cell::new(enabled)
            };
            let baseline = config.baseline.map_or_else(
                || "-".to_string(),
                |b| format!("{} .. {}", format_minute(b.start_minute), format_minute(b.end_minute)),
            );
            let alerts = if config.alert_enabled {
                format!("> {:.2} x{}", config.alert_threshold, config.num_occurrences_for_alert)
            } else {
                "off".to_string()
            };

            table.add_row(vec![
                Cell::new(truncate(&config.id, 24)),
                Cell::new(truncate(&config.account_id, 16)),
                Cell::new(config.kind.as_str()),
                Cell::new(&config.state_type),
                enabled_cell,
                Cell::new(baseline),
                Cell::new(alerts),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

/// Respects NO_COLOR and dumb terminals.
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Queued => Color::Yellow,
        ExecutionStatus::Running => Color::Cyan,
        ExecutionStatus::Success => Color::Green,
        ExecutionStatus::Failed => Color::Red,
    }
}

fn status_icon(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Queued => "○",
        ExecutionStatus::Running => "⟳",
        ExecutionStatus::Success => "✓",
        ExecutionStatus::Failed => "✗",
    }
}

fn format_minute(minute: i64) -> String {
    minute_to_datetime(minute).format("%Y-%m-%d %H:%M").to_string()
}
