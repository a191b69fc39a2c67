//! Per-source timing and outcome counts for one run.

use std::time::Duration;

use tokio::time::Instant;

use crate::date_range::TimeWindow;
use crate::destination::DestinationFactory;
use crate::pool::EnginePool;
use crate::source::Source;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetrics {
    pub name: String,
    pub duration: Duration,
    /// Records the source handed to the engines.
    pub operations: usize,
    /// Errors recorded while the source ran.
    pub errors: usize,
}

impl SourceMetrics {
    /// Percentage of operations that did not produce an error. `None` when nothing ran.
    pub fn success_rate(&self) -> Option<f64> {
        if self.operations == 0 {
            return None;
        }
        let succeeded = self.operations.saturating_sub(self.errors);
        Some(succeeded as f64 / self.operations as f64 * 100.0)
    }

    /// "97.50%", or "N/A" when nothing ran.
    pub fn success_rate_label(&self) -> String {
        match self.success_rate() {
            Some(rate) => format!("{rate:.2}%"),
            None => "N/A".to_string(),
        }
    }
}

pub struct PerformanceMonitor {
    started: Instant,
    sources: Vec<SourceMetrics>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        PerformanceMonitor {
            started: Instant::now(),
            sources: Vec::new(),
        }
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `source` against `pool`, timing it and counting the errors it recorded.
    pub async fn track<S: Source, F: DestinationFactory>(
        &mut self,
        source: &mut S,
        pool: &mut EnginePool<F>,
        window: TimeWindow,
    ) -> SourceMetrics {
        let errors_before = pool.reporter().len();
        let started = Instant::now();

        let operations = source.sync(pool, window).await;

        let metrics = SourceMetrics {
            name: source.name().to_string(),
            duration: started.elapsed(),
            operations,
            errors: pool.reporter().len().saturating_sub(errors_before),
        };
        tracing::info!(
            source = %metrics.name,
            duration = %format_duration(metrics.duration),
            operations = metrics.operations,
            errors = metrics.errors,
            "Source finished"
        );

        self.sources.push(metrics.clone());
        metrics
    }

    pub fn sources(&self) -> &[SourceMetrics] {
        &self.sources
    }

    /// Time since the monitor was created.
    pub fn total_duration(&self) -> Duration {
        self.started.elapsed()
    }
}

/// "850ms", "12.35s" or "2.50m".
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.2}m", duration.as_secs_f64() / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::{MemoryCalendar, MemoryFactory};
    use crate::engine::EngineSettings;
    use crate::error::SyncError;
    use crate::report::ErrorReporter;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    struct SlowSource;

    impl Source for SlowSource {
        fn name(&self) -> &str {
            "Slow"
        }

        async fn sync<F: DestinationFactory>(
            &mut self,
            pool: &mut EnginePool<F>,
            _window: TimeWindow,
        ) -> usize {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            pool.reporter()
                .record("Fetching slow data", &SyncError::Config("no token".into()));
            4
        }
    }

    fn metrics(operations: usize, errors: usize) -> SourceMetrics {
        SourceMetrics {
            name: "Toggl".into(),
            duration: Duration::ZERO,
            operations,
            errors,
        }
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(metrics(4, 1).success_rate(), Some(75.0));
        assert_eq!(metrics(4, 1).success_rate_label(), "75.00%");
        assert_eq!(metrics(3, 0).success_rate_label(), "100.00%");
        assert_eq!(metrics(2, 5).success_rate(), Some(0.0));
        assert_eq!(metrics(0, 1).success_rate(), None);
        assert_eq!(metrics(0, 0).success_rate_label(), "N/A");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(12_345)), "12.35s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2.50m");
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_times_source_and_counts_its_errors() {
        let reporter = Arc::new(ErrorReporter::new());
        reporter.record("Earlier failure", &SyncError::Config("bad".into()));
        let mut pool = EnginePool::new(
            MemoryFactory::default(),
            MemoryCalendar::new("primary"),
            EngineSettings::default(),
            reporter,
        );
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 21, 0, 0, 0).unwrap(),
        );
        let mut monitor = PerformanceMonitor::new();

        let metrics = monitor.track(&mut SlowSource, &mut pool, window).await;

        assert_eq!(metrics.name, "Slow");
        assert_eq!(metrics.operations, 4);
        assert_eq!(metrics.errors, 1);
        assert!(metrics.duration >= Duration::from_millis(1_500));
        assert_eq!(monitor.sources(), &[metrics]);
        assert!(monitor.total_duration() >= Duration::from_millis(1_500));
    }
}
