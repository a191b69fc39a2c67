//! One engine per destination, with records routed between them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::batch::FlushSummary;
use crate::date_range::TimeWindow;
use crate::destination::{Destination, DestinationFactory};
use crate::engine::{Engine, EngineSettings, OrphanSet, SyncStats};
use crate::error::SyncResult;
use crate::record::CanonicalRecord;
use crate::report::ErrorReporter;

/// Orphan sets for one pass: the default destination plus every alternate the
/// pass routes to or is configured to route to.
#[derive(Debug, Clone)]
pub struct PoolPass {
    pub default: OrphanSet,
    pub alternates: BTreeMap<String, OrphanSet>,
}

/// What the end of a pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Orphan deletes queued by the sweep.
    pub deleted: usize,
    pub flushed: FlushSummary,
}

/// The default engine plus lazily opened engines for routed destinations.
///
/// Engines live for the whole run so their counters cover every source.
pub struct EnginePool<F: DestinationFactory> {
    factory: F,
    settings: EngineSettings,
    reporter: Arc<ErrorReporter>,
    default: Engine<F::Destination>,
    alternates: BTreeMap<String, Engine<F::Destination>>,
    unavailable: HashSet<String>,
}

impl<F: DestinationFactory> EnginePool<F> {
    pub fn new(
        factory: F,
        default: F::Destination,
        settings: EngineSettings,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        EnginePool {
            default: Engine::new(default, settings, reporter.clone()),
            factory,
            settings,
            reporter,
            alternates: BTreeMap::new(),
            unavailable: HashSet::new(),
        }
    }

    /// Open the default destination. Failing to do so is fatal for the run.
    pub async fn open(
        factory: F,
        default_id: &str,
        settings: EngineSettings,
        reporter: Arc<ErrorReporter>,
    ) -> SyncResult<Self> {
        let default = factory.open(default_id).await?;
        Ok(Self::new(factory, default, settings, reporter))
    }

    pub fn default_id(&self) -> &str {
        self.default.destination().id()
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// Start a pass for `prefix`.
    ///
    /// `routed` lists the destinations the source may route records to. Each of them
    /// is swept when the pass finishes, even if no record lands there this time, so
    /// events re-routed elsewhere or gone from the source are removed.
    pub async fn begin_pass(
        &mut self,
        prefix: &str,
        window: TimeWindow,
        routed: &[String],
    ) -> PoolPass {
        let mut pass = PoolPass {
            default: self.default.begin_pass(prefix, window),
            alternates: BTreeMap::new(),
        };
        for id in routed {
            self.enlist(&mut pass, id).await;
        }
        pass
    }

    /// Reconcile `record` against `target`, or the default destination when `target` is `None`.
    pub async fn sync_record(
        &mut self,
        pass: &mut PoolPass,
        target: Option<&str>,
        record: CanonicalRecord,
    ) {
        if let Some(id) = target {
            if self.enlist(pass, id).await {
                if let (Some(engine), Some(orphans)) =
                    (self.alternates.get_mut(id), pass.alternates.get_mut(id))
                {
                    engine.sync_record(orphans, record).await;
                }
                return;
            }
        }

        self.default.sync_record(&mut pass.default, record).await;
    }

    /// Make `id` part of `pass`, opening its engine on first use.
    ///
    /// Returns false when records for `id` belong on the default destination: either
    /// `id` is the default, or it cannot be opened.
    async fn enlist(&mut self, pass: &mut PoolPass, id: &str) -> bool {
        if id == self.default_id() || !self.ensure_alternate(id).await {
            return false;
        }

        if !pass.alternates.contains_key(id) {
            if let Some(engine) = self.alternates.get_mut(id) {
                let orphans = engine.begin_pass(&pass.default.prefix, pass.default.window);
                pass.alternates.insert(id.to_string(), orphans);
            }
        }
        true
    }

    /// Open the engine for `id` on first use. Returns false if it cannot be opened.
    async fn ensure_alternate(&mut self, id: &str) -> bool {
        if self.alternates.contains_key(id) {
            return true;
        }
        if self.unavailable.contains(id) {
            return false;
        }

        match self.factory.open(id).await {
            Ok(destination) => {
                tracing::info!("Routing records to calendar {}", id);
                self.alternates.insert(
                    id.to_string(),
                    Engine::new(destination, self.settings, self.reporter.clone()),
                );
                true
            }
            Err(e) => {
                self.reporter.record(format!("Opening calendar {id}"), &e);
                tracing::warn!(
                    "Falling back to {} for records routed to {}",
                    self.default_id(),
                    id
                );
                self.unavailable.insert(id.to_string());
                false
            }
        }
    }

    /// Sweep orphans on every destination in the pass, then flush those destinations.
    pub async fn finish_pass(&mut self, pass: PoolPass) -> PassSummary {
        let ids: Vec<String> = pass.alternates.keys().cloned().collect();

        let mut deleted = self.default.delete_orphans(pass.default).await;
        for (id, orphans) in pass.alternates {
            if let Some(engine) = self.alternates.get_mut(&id) {
                deleted += engine.delete_orphans(orphans).await;
            }
        }

        let mut flushed = self.default.flush().await;
        for id in &ids {
            if let Some(engine) = self.alternates.get_mut(id) {
                flushed += engine.flush().await;
            }
        }

        PassSummary { deleted, flushed }
    }

    /// Flush the default destination and every alternate opened so far.
    pub async fn flush_all(&mut self) -> FlushSummary {
        let mut summary = self.default.flush().await;
        for engine in self.alternates.values_mut() {
            summary += engine.flush().await;
        }
        summary
    }

    /// Operations queued on any destination and not yet flushed.
    pub fn pending(&self) -> usize {
        std::iter::once(&self.default)
            .chain(self.alternates.values())
            .map(Engine::pending)
            .sum()
    }

    /// Counters per destination, default first.
    pub fn stats(&self) -> Vec<(String, SyncStats)> {
        std::iter::once(&self.default)
            .chain(self.alternates.values())
            .map(|engine| (engine.destination().id().to_string(), engine.stats()))
            .collect()
    }

    pub fn total_stats(&self) -> SyncStats {
        let mut total = SyncStats::default();
        for (_, stats) in self.stats() {
            total += stats;
        }
        total
    }

    /// Everything flushed so far, across destinations.
    pub fn flush_totals(&self) -> FlushSummary {
        let mut totals = self.default.flush_totals();
        for engine in self.alternates.values() {
            totals += engine.flush_totals();
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::{MemoryCalendar, MemoryFactory};
    use crate::record::{ColorTag, Span};
    use crate::retry::RetryPolicy;
    use chrono::{TimeZone, Utc};

    const PREFIX: &str = "toggl-id:";

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 21, 23, 59, 59).unwrap(),
        )
    }

    fn record(id: &str, hour: u32) -> CanonicalRecord {
        CanonicalRecord::new(
            format!("{PREFIX}{id}"),
            format!("Entry {id}"),
            Span::Timed {
                start: Utc.with_ymd_and_hms(2025, 3, 20, hour, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 3, 20, hour, 30, 0).unwrap(),
            },
            String::new(),
            ColorTag::Orange,
        )
        .unwrap()
    }

    fn pool(
        default: &MemoryCalendar,
        others: &[&MemoryCalendar],
    ) -> (EnginePool<MemoryFactory>, Arc<ErrorReporter>) {
        let reporter = Arc::new(ErrorReporter::new());
        let settings = EngineSettings {
            retry: RetryPolicy::none(),
            ..EngineSettings::default()
        };
        let pool = EnginePool::new(
            MemoryFactory::with_calendars(others),
            default.clone(),
            settings,
            reporter.clone(),
        );
        (pool, reporter)
    }

    #[tokio::test]
    async fn test_routed_record_uses_its_own_engine() {
        let primary = MemoryCalendar::new("primary");
        let work = MemoryCalendar::new("work");
        let (mut pool, _) = pool(&primary, &[&work]);

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, None, record("1", 9)).await;
        pool.sync_record(&mut pass, Some("work"), record("2", 11)).await;

        assert!(pass.default.keys.contains("toggl-id:1"));
        assert!(!pass.default.keys.contains("toggl-id:2"));
        assert!(pass.alternates["work"].keys.contains("toggl-id:2"));

        pool.finish_pass(pass).await;
        pool.flush_all().await;

        assert!(primary.event_with_key("toggl-id:1").is_some());
        assert!(primary.event_with_key("toggl-id:2").is_none());
        assert!(work.event_with_key("toggl-id:2").is_some());

        let stats = pool.stats();
        assert_eq!(stats[0].0, "primary");
        assert_eq!(stats[0].1.created, 1);
        assert_eq!(stats[1].0, "work");
        assert_eq!(stats[1].1.created, 1);
        assert_eq!(pool.total_stats().created, 2);
    }

    #[tokio::test]
    async fn test_target_equal_to_default_stays_on_default() {
        let primary = MemoryCalendar::new("primary");
        let (mut pool, _) = pool(&primary, &[]);

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, Some("primary"), record("1", 9)).await;

        assert!(pass.alternates.is_empty());
        assert!(pass.default.keys.contains("toggl-id:1"));
    }

    #[tokio::test]
    async fn test_rerouted_record_moves_between_calendars() {
        let primary = MemoryCalendar::new("primary");
        let work = MemoryCalendar::new("work");
        let (mut pool, _) = pool(&primary, &[&work]);

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, None, record("1", 9)).await;
        pool.finish_pass(pass).await;
        pool.flush_all().await;

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, Some("work"), record("1", 9)).await;
        pool.finish_pass(pass).await;
        pool.flush_all().await;

        assert!(primary.events().is_empty());
        assert_eq!(work.events().len(), 1);
        assert_eq!(pool.stats()[0].1.deleted, 1);
    }

    #[tokio::test]
    async fn test_unknown_destination_falls_back_to_default() {
        let primary = MemoryCalendar::new("primary");
        let (mut pool, reporter) = pool(&primary, &[]);

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, Some("gone"), record("1", 9)).await;
        pool.sync_record(&mut pass, Some("gone"), record("2", 11)).await;
        pool.finish_pass(pass).await;
        pool.flush_all().await;

        assert_eq!(primary.events().len(), 2);
        let errors = reporter.entries();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "Opening calendar gone");
    }

    #[tokio::test]
    async fn test_configured_alternate_is_swept_without_records() {
        let primary = MemoryCalendar::new("primary");
        let work = MemoryCalendar::new("work");
        let (mut pool, _) = pool(&primary, &[&work]);
        let routed = vec!["work".to_string()];

        let mut pass = pool.begin_pass(PREFIX, window(), &routed).await;
        pool.sync_record(&mut pass, Some("work"), record("1", 9)).await;
        pool.finish_pass(pass).await;
        assert_eq!(work.events().len(), 1);

        // Re-tagged back to the default calendar
        let mut pass = pool.begin_pass(PREFIX, window(), &routed).await;
        pool.sync_record(&mut pass, None, record("1", 9)).await;
        let summary = pool.finish_pass(pass).await;

        assert_eq!(primary.events().len(), 1);
        assert!(work.events().is_empty());
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.flushed.applied, 2);
    }

    #[tokio::test]
    async fn test_other_prefixes_survive_sweep() {
        let primary = MemoryCalendar::new("primary");
        let work = MemoryCalendar::new("work");
        work.seed(&record("9", 9));
        let sleep = CanonicalRecord::new(
            "google-fit-sleep:s1".into(),
            "😴 Sleep: 7h 30m".into(),
            Span::Timed {
                start: Utc.with_ymd_and_hms(2025, 3, 19, 23, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 3, 20, 6, 30, 0).unwrap(),
            },
            String::new(),
            ColorTag::Mauve,
        )
        .unwrap();
        work.seed(&sleep);
        let (mut pool, _) = pool(&primary, &[&work]);

        let pass = pool
            .begin_pass(PREFIX, window(), &["work".to_string()])
            .await;
        pool.finish_pass(pass).await;

        assert!(work.event_with_key("toggl-id:9").is_none());
        assert!(work.event_with_key("google-fit-sleep:s1").is_some());
    }

    #[tokio::test]
    async fn test_unavailable_configured_alternate_is_reported_once() {
        let primary = MemoryCalendar::new("primary");
        let (mut pool, reporter) = pool(&primary, &[]);
        let routed = vec!["gone".to_string()];

        let mut pass = pool.begin_pass(PREFIX, window(), &routed).await;
        assert!(pass.alternates.is_empty());
        pool.sync_record(&mut pass, Some("gone"), record("1", 9)).await;
        pool.finish_pass(pass).await;

        assert_eq!(primary.events().len(), 1);
        assert_eq!(reporter.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_pass_flushes_every_destination_in_pass() {
        let primary = MemoryCalendar::new("primary");
        let work = MemoryCalendar::new("work");
        let (mut pool, _) = pool(&primary, &[&work]);

        let mut pass = pool.begin_pass(PREFIX, window(), &[]).await;
        pool.sync_record(&mut pass, None, record("1", 9)).await;
        pool.sync_record(&mut pass, Some("work"), record("2", 11)).await;
        assert_eq!(pool.pending(), 2);

        let summary = pool.finish_pass(pass).await;

        assert_eq!(pool.pending(), 0);
        assert_eq!(summary.flushed.applied, 2);
        assert_eq!(primary.events().len(), 1);
        assert_eq!(work.events().len(), 1);
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_default() {
        let reporter = Arc::new(ErrorReporter::new());
        let result = EnginePool::open(
            MemoryFactory::default(),
            "missing",
            EngineSettings::default(),
            reporter,
        )
        .await;

        assert!(matches!(
            result,
            Err(crate::error::SyncError::DestinationNotFound(_))
        ));
    }
}
