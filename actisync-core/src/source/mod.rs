//! Activity sources: fetch raw activities and turn them into canonical records.
//!
//! Every source owns one or more key prefixes. Each prefix gets its own pass, so
//! an orphan sweep for one kind of activity never touches another.

mod google_fit;
mod toggl;

pub use google_fit::GoogleFitSource;
pub use toggl::TogglSource;

use chrono::Duration;

use crate::date_range::TimeWindow;
use crate::destination::DestinationFactory;
use crate::pool::EnginePool;
use crate::record::CanonicalRecord;

/// A canonical record and the calendar it should land in (`None` for the default).
#[derive(Debug, Clone)]
pub struct RoutedRecord {
    pub target: Option<String>,
    pub record: CanonicalRecord,
}

impl RoutedRecord {
    pub fn to_default(record: CanonicalRecord) -> Self {
        RoutedRecord {
            target: None,
            record,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Source {
    fn name(&self) -> &str;

    /// Sync everything in `window`. Failures end up on the pool's reporter.
    ///
    /// Returns the number of records handed to the engines.
    async fn sync<F: DestinationFactory>(
        &mut self,
        pool: &mut EnginePool<F>,
        window: TimeWindow,
    ) -> usize;
}

/// Run one complete pass for `prefix`: reconcile every record, sweep orphans on the
/// default destination and on every calendar in `routed`, then flush.
///
/// Only call this with a complete fetch. Records missing from `records` are
/// deleted from the calendar.
pub(crate) async fn run_pass<F: DestinationFactory>(
    pool: &mut EnginePool<F>,
    prefix: &str,
    window: TimeWindow,
    routed: &[String],
    records: Vec<RoutedRecord>,
) -> usize {
    let count = records.len();
    tracing::info!("Processing {} records for {}", count, prefix);

    let mut pass = pool.begin_pass(prefix, window, routed).await;
    for routed in records {
        pool.sync_record(&mut pass, routed.target.as_deref(), routed.record)
            .await;
    }
    let summary = pool.finish_pass(pass).await;
    tracing::debug!(
        "Finished pass for {}: {} orphans, {} applied, {} failed",
        prefix,
        summary.deleted,
        summary.flushed.applied,
        summary.flushed.failed
    );

    count
}

/// "2h 5m"
pub(crate) fn format_hours_minutes(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}
