//! Terminal rendering for actisync-core types.

use actisync_core::batch::{FlushSummary, OperationKind};
use actisync_core::monitor::{SourceMetrics, format_duration};
use actisync_core::{PerformanceMonitor, SyncStats, TimeWindow};
use chrono_tz::Tz;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for OperationKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            OperationKind::Create => symbol.green().to_string(),
            OperationKind::Update => symbol.yellow().to_string(),
            OperationKind::Delete => symbol.red().to_string(),
        }
    }
}

impl Render for SyncStats {
    fn render(&self) -> String {
        if self.changes() == 0 {
            return format!("No changes ({} up to date)", self.skipped)
                .dimmed()
                .to_string();
        }

        let mut parts = Vec::new();
        if self.created > 0 {
            parts.push(format!("{} {} created", OperationKind::Create.render(), self.created));
        }
        if self.updated > 0 {
            parts.push(format!("{} {} updated", OperationKind::Update.render(), self.updated));
        }
        if self.deleted > 0 {
            parts.push(format!("{} {} deleted", OperationKind::Delete.render(), self.deleted));
        }
        if self.skipped > 0 {
            parts.push(format!("{} up to date", self.skipped).dimmed().to_string());
        }
        parts.join("  ")
    }
}

impl Render for FlushSummary {
    fn render(&self) -> String {
        if self.discarded > 0 {
            return format!("{} operations not applied (dry run)", self.discarded)
                .yellow()
                .to_string();
        }
        if self.failed > 0 {
            return format!("{} applied, {} failed", self.applied, self.failed)
                .red()
                .to_string();
        }
        format!("{} applied", self.applied).dimmed().to_string()
    }
}

impl Render for SourceMetrics {
    /// "Toggl 12 records in 1.25s (2 errors)"
    fn render(&self) -> String {
        let mut line = format!(
            "{} {}",
            self.name.bold(),
            format!(
                "{} records in {}",
                self.operations,
                format_duration(self.duration)
            )
            .dimmed()
        );
        if self.errors > 0 {
            line.push_str(&format!(" {}", format!("({} errors)", self.errors).red()));
        }
        line
    }
}

impl Render for PerformanceMonitor {
    fn render(&self) -> String {
        let mut lines = vec![
            "Performance".bold().to_string(),
            format!("  Total: {}", format_duration(self.total_duration())),
        ];
        for source in self.sources() {
            lines.push(format!(
                "  {}: {}, {} success ({} records, {} errors)",
                source.name,
                format_duration(source.duration),
                source.success_rate_label(),
                source.operations,
                source.errors
            ));
        }
        lines.join("\n")
    }
}

pub fn render_calendar(id: &str) -> String {
    format!("📅 {}", id)
}

/// "2025-03-14 → 2025-03-21 (Europe/Amsterdam)"
pub fn render_window(window: &TimeWindow, tz: Tz) -> String {
    format!(
        "{} → {} ({})",
        window.start.with_timezone(&tz).format("%Y-%m-%d"),
        window.end.with_timezone(&tz).format("%Y-%m-%d"),
        tz.name()
    )
}
