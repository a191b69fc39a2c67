//! Reconciliation of canonical records against one destination.
//!
//! A pass starts with [`Engine::begin_pass`], feeds every record of one source
//! through [`Engine::sync_record`] and ends with [`Engine::delete_orphans`], which
//! removes events carrying the pass prefix that no record claimed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::batch::{Batcher, FlushSummary, PendingOperation};
use crate::config::SyncConfig;
use crate::constants::{DEFAULT_BATCH_SIZE, SEARCH_BUFFER_HOURS};
use crate::date_range::TimeWindow;
use crate::destination::Destination;
use crate::error::SyncResult;
use crate::event::{DestinationEvent, description_has_prefix};
use crate::identity::{build_update, needs_update};
use crate::record::{CanonicalRecord, Span};
use crate::report::ErrorReporter;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub dry_run: bool,
    pub retry: RetryPolicy,
    /// Zone that all-day records are anchored in.
    pub timezone: Tz,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            retry: RetryPolicy::default(),
            timezone: Tz::UTC,
        }
    }
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        EngineSettings {
            batch_size: config.batch_size,
            dry_run: config.dry_run,
            retry: config.retry,
            timezone: config.timezone,
        }
    }
}

/// Decisions taken by an engine since it was constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl SyncStats {
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: SyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} skipped",
            self.created, self.updated, self.deleted, self.skipped
        )
    }
}

/// Identity keys seen during one pass over one prefix and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanSet {
    pub prefix: String,
    pub window: TimeWindow,
    pub keys: HashSet<String>,
}

impl OrphanSet {
    pub fn new(prefix: &str, window: TimeWindow) -> Self {
        OrphanSet {
            prefix: prefix.to_string(),
            window,
            keys: HashSet::new(),
        }
    }
}

/// Cache key for [`Engine::find_by_key`]: a key is only reused for the same span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    identity_key: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

pub struct Engine<D: Destination> {
    destination: D,
    settings: EngineSettings,
    batcher: Batcher,
    cache: HashMap<LookupKey, Option<DestinationEvent>>,
    stats: SyncStats,
    reporter: Arc<ErrorReporter>,
}

impl<D: Destination> Engine<D> {
    pub fn new(destination: D, settings: EngineSettings, reporter: Arc<ErrorReporter>) -> Self {
        let batcher = Batcher::new(
            settings.batch_size,
            settings.dry_run,
            settings.retry,
            reporter.clone(),
        );

        Engine {
            destination,
            settings,
            batcher,
            cache: HashMap::new(),
            stats: SyncStats::default(),
            reporter,
        }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn flush_totals(&self) -> FlushSummary {
        self.batcher.totals()
    }

    /// Operations queued but not yet flushed.
    pub fn pending(&self) -> usize {
        self.batcher.len()
    }

    pub fn begin_pass(&mut self, prefix: &str, window: TimeWindow) -> OrphanSet {
        tracing::debug!(
            "Starting pass for {} on {} ({} to {})",
            prefix,
            self.destination.id(),
            window.start,
            window.end
        );
        OrphanSet::new(prefix, window)
    }

    /// Decide what `record` needs and queue it.
    ///
    /// The key always joins the orphan set, even if reconciling fails, so a
    /// transient failure never gets an existing event swept. Failures are
    /// recorded on the reporter and never propagate.
    pub async fn sync_record(&mut self, orphans: &mut OrphanSet, record: CanonicalRecord) {
        if !orphans.keys.insert(record.identity_key().to_string()) {
            tracing::debug!("Skipping duplicate record in pass: {}", record.identity_key());
            self.stats.skipped += 1;
            return;
        }

        let title = record.title.clone();
        if let Err(e) = self.reconcile(record).await {
            self.reporter.record(format!("Syncing event: {title}"), &e);
        }
    }

    async fn reconcile(&mut self, record: CanonicalRecord) -> SyncResult<()> {
        let key = self.lookup_key(&record);
        let operation = match self.find_by_key(&record).await? {
            Some(existing) => {
                if !needs_update(&existing, &record, &self.reporter) {
                    tracing::debug!("Event up to date: {}", record.title);
                    self.stats.skipped += 1;
                    return Ok(());
                }
                self.stats.updated += 1;
                PendingOperation::Update {
                    update: build_update(&existing, &record),
                    event: existing,
                }
            }
            None => {
                self.stats.created += 1;
                PendingOperation::Create(record)
            }
        };

        self.cache.remove(&key);
        self.batcher.enqueue(operation, &self.destination).await;
        Ok(())
    }

    /// The event carrying `record`'s identity key, searched within 48 hours of its span.
    pub async fn find_by_key(
        &mut self,
        record: &CanonicalRecord,
    ) -> SyncResult<Option<DestinationEvent>> {
        let key = self.lookup_key(record);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let window =
            TimeWindow::new(key.start, key.end).widen(Duration::hours(SEARCH_BUFFER_HOURS));
        let destination = &self.destination;
        let events = self
            .settings
            .retry
            .run(|| destination.search(&window))
            .await?;

        let found = events
            .into_iter()
            .find(|event| event.embedded_key() == Some(record.identity_key()));

        self.cache.insert(key, found.clone());
        Ok(found)
    }

    fn lookup_key(&self, record: &CanonicalRecord) -> LookupKey {
        let window = match record.span {
            Span::Timed { start, end } => TimeWindow::new(start, end),
            Span::AllDay { date } => TimeWindow::for_day(date, self.settings.timezone),
        };

        LookupKey {
            identity_key: record.identity_key().to_string(),
            start: window.start,
            end: window.end,
        }
    }

    /// Queue deletes for events under the pass prefix whose key no record claimed.
    ///
    /// Returns the number of deletes queued.
    pub async fn delete_orphans(&mut self, orphans: OrphanSet) -> usize {
        if self.settings.dry_run {
            tracing::info!(
                "[DRY RUN] Would delete orphaned events with prefix: {}",
                orphans.prefix
            );
            return 0;
        }

        let destination = &self.destination;
        let events = match self
            .settings
            .retry
            .run(|| destination.search(&orphans.window))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                self.reporter.record(
                    format!("Deleting orphaned events with prefix: {}", orphans.prefix),
                    &e,
                );
                return 0;
            }
        };

        let orphaned: Vec<DestinationEvent> = events
            .into_iter()
            .filter(|event| {
                event
                    .description
                    .as_deref()
                    .is_some_and(|d| description_has_prefix(d, &orphans.prefix))
            })
            .filter(|event| {
                event
                    .embedded_key()
                    .is_none_or(|key| !orphans.keys.contains(key))
            })
            .collect();

        let count = orphaned.len();
        for event in orphaned {
            tracing::debug!("Orphaned event: {}", event.title);
            self.stats.deleted += 1;
            self.batcher
                .enqueue(PendingOperation::Delete(event), &self.destination)
                .await;
        }

        if count > 0 {
            tracing::info!("Found {} orphaned events with prefix {}", count, orphans.prefix);
        }
        count
    }

    /// Apply everything queued. Cached lookups are dropped since they may be stale.
    pub async fn flush(&mut self) -> FlushSummary {
        self.cache.clear();
        self.batcher.flush(&self.destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::MemoryCalendar;
    use crate::event::EventTime;
    use crate::identity::{compute_key, render_description};
    use crate::record::ColorTag;
    use chrono::{NaiveDate, TimeZone};

    const PREFIX: &str = "toggl-id:";

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 21, 23, 59, 59).unwrap(),
        )
    }

    fn record(id: &str, title: &str, hour: u32) -> CanonicalRecord {
        CanonicalRecord::new(
            compute_key(id, PREFIX),
            title.into(),
            Span::Timed {
                start: Utc.with_ymd_and_hms(2025, 3, 20, hour, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 3, 20, hour, 45, 0).unwrap(),
            },
            "Duration: 0h 45m".into(),
            ColorTag::Orange,
        )
        .unwrap()
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            retry: RetryPolicy::none(),
            ..EngineSettings::default()
        }
    }

    fn engine(calendar: &MemoryCalendar) -> (Engine<MemoryCalendar>, Arc<ErrorReporter>) {
        let reporter = Arc::new(ErrorReporter::new());
        (
            Engine::new(calendar.clone(), settings(), reporter.clone()),
            reporter,
        )
    }

    async fn run_pass(engine: &mut Engine<MemoryCalendar>, records: Vec<CanonicalRecord>) {
        let mut orphans = engine.begin_pass(PREFIX, window());
        for record in records {
            engine.sync_record(&mut orphans, record).await;
        }
        engine.delete_orphans(orphans).await;
        engine.flush().await;
    }

    #[tokio::test]
    async fn test_creates_missing_events() {
        let calendar = MemoryCalendar::new("primary");
        let (mut engine, reporter) = engine(&calendar);

        run_pass(&mut engine, vec![record("1", "Writing", 9), record("2", "Email", 11)]).await;

        assert_eq!(engine.stats().created, 2);
        assert_eq!(calendar.events().len(), 2);
        let event = calendar.event_with_key("toggl-id:1").unwrap();
        assert_eq!(event.title, "Writing");
        assert!(!reporter.has_errors());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let calendar = MemoryCalendar::new("primary");
        let (mut engine, _) = engine(&calendar);
        let records = || vec![record("1", "Writing", 9), record("2", "Email", 11)];

        run_pass(&mut engine, records()).await;
        let mutations = calendar.mutations();

        run_pass(&mut engine, records()).await;

        assert_eq!(calendar.mutations(), mutations);
        assert_eq!(
            engine.stats(),
            SyncStats {
                created: 2,
                updated: 0,
                deleted: 0,
                skipped: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_changed_title_updates_in_place() {
        let calendar = MemoryCalendar::new("primary");
        let existing = calendar.seed(&record("1", "Writing", 9));
        let (mut engine, _) = engine(&calendar);

        run_pass(&mut engine, vec![record("1", "Writing docs", 9)]).await;

        assert_eq!(engine.stats().updated, 1);
        let events = calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, existing.id);
        assert_eq!(events[0].title, "Writing docs");
    }

    #[tokio::test]
    async fn test_moved_record_keeps_identity() {
        let calendar = MemoryCalendar::new("primary");
        calendar.seed(&record("1", "Writing", 9));
        let (mut engine, _) = engine(&calendar);

        run_pass(&mut engine, vec![record("1", "Writing", 13)]).await;

        let events = calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].start,
            Some(EventTime::DateTime(
                Utc.with_ymd_and_hms(2025, 3, 20, 13, 0, 0).unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn test_orphan_sweep_deletes_unclaimed_events() {
        let calendar = MemoryCalendar::new("primary");
        let (mut engine, _) = engine(&calendar);

        run_pass(
            &mut engine,
            vec![record("A", "A", 8), record("B", "B", 10), record("C", "C", 12)],
        )
        .await;
        run_pass(&mut engine, vec![record("A", "A", 8), record("C", "C", 12)]).await;

        assert_eq!(engine.stats().deleted, 1);
        assert!(calendar.event_with_key("toggl-id:B").is_none());
        assert!(calendar.event_with_key("toggl-id:A").is_some());
        assert!(calendar.event_with_key("toggl-id:C").is_some());
    }

    #[tokio::test]
    async fn test_orphan_sweep_leaves_foreign_events() {
        let calendar = MemoryCalendar::new("primary");
        let start = Utc.with_ymd_and_hms(2025, 3, 18, 9, 0, 0).unwrap();
        calendar.insert(DestinationEvent {
            id: String::new(),
            title: "Dentist".into(),
            description: Some("bring insurance card".into()),
            start: Some(EventTime::DateTime(start)),
            end: Some(EventTime::DateTime(start + Duration::hours(1))),
            color: None,
        });
        let steps = CanonicalRecord::new(
            "google-fit-steps:2025-03-18".into(),
            "🚶 8,000 Steps".into(),
            Span::AllDay {
                date: NaiveDate::from_ymd_opt(2025, 3, 18).unwrap(),
            },
            "Steps: 8000".into(),
            ColorTag::Green,
        )
        .unwrap();
        calendar.seed(&steps);
        let (mut engine, _) = engine(&calendar);

        run_pass(&mut engine, vec![]).await;

        assert_eq!(engine.stats().deleted, 0);
        assert_eq!(calendar.events().len(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_is_recorded_per_record() {
        let calendar = MemoryCalendar::new("primary");
        calendar.fail_searches();
        let (mut engine, reporter) = engine(&calendar);

        let mut orphans = engine.begin_pass(PREFIX, window());
        engine.sync_record(&mut orphans, record("1", "Writing", 9)).await;
        engine.sync_record(&mut orphans, record("2", "Email", 11)).await;

        let contexts: Vec<_> = reporter.entries().into_iter().map(|e| e.context).collect();
        assert_eq!(contexts, vec!["Syncing event: Writing", "Syncing event: Email"]);
        assert_eq!(orphans.keys.len(), 2);

        engine.delete_orphans(orphans).await;
        assert_eq!(
            reporter.entries()[2].context,
            "Deleting orphaned events with prefix: toggl-id:"
        );
        assert_eq!(calendar.mutations(), 0);
    }

    #[tokio::test]
    async fn test_lookup_is_cached_until_flush() {
        let calendar = MemoryCalendar::new("primary");
        let (mut engine, _) = engine(&calendar);
        let writing = record("1", "Writing", 9);

        engine.find_by_key(&writing).await.unwrap();
        engine.find_by_key(&writing).await.unwrap();
        assert_eq!(calendar.searches(), 1);

        engine.flush().await;
        engine.find_by_key(&writing).await.unwrap();
        assert_eq!(calendar.searches(), 2);
    }

    #[tokio::test]
    async fn test_key_match_is_exact() {
        let calendar = MemoryCalendar::new("primary");
        calendar.seed(&record("12", "Other", 9));
        let (mut engine, _) = engine(&calendar);

        let found = engine.find_by_key(&record("1", "Writing", 9)).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_record_decided_once() {
        let calendar = MemoryCalendar::new("primary");
        let (mut engine, _) = engine(&calendar);

        run_pass(&mut engine, vec![record("1", "Writing", 9), record("1", "Writing", 9)]).await;

        assert_eq!(engine.stats().created, 1);
        assert_eq!(engine.stats().skipped, 1);
        assert_eq!(calendar.events().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_decides_without_writing() {
        let calendar = MemoryCalendar::new("primary");
        calendar.seed(&record("B", "B", 10));
        let reporter = Arc::new(ErrorReporter::new());
        let mut engine = Engine::new(
            calendar.clone(),
            EngineSettings {
                dry_run: true,
                ..settings()
            },
            reporter,
        );

        let mut orphans = engine.begin_pass(PREFIX, window());
        engine.sync_record(&mut orphans, record("A", "A", 8)).await;
        let searches = calendar.searches();
        assert_eq!(engine.delete_orphans(orphans).await, 0);
        let summary = engine.flush().await;

        assert_eq!(calendar.searches(), searches);
        assert_eq!(engine.stats().created, 1);
        assert_eq!(summary.discarded, 1);
        assert_eq!(calendar.mutations(), 0);
        assert_eq!(calendar.events().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_is_left_alone() {
        let calendar = MemoryCalendar::new("primary");
        let writing = record("1", "Writing", 9);
        calendar.insert(DestinationEvent {
            id: String::new(),
            title: writing.title.clone(),
            description: Some(render_description(&writing)),
            start: Some(EventTime::DateTime(writing.span.start().unwrap())),
            end: None,
            color: None,
        });
        let (mut engine, reporter) = engine(&calendar);

        let mut orphans = engine.begin_pass(PREFIX, window());
        engine.sync_record(&mut orphans, writing).await;
        engine.flush().await;

        assert_eq!(engine.stats().skipped, 1);
        assert_eq!(calendar.mutations(), 0);
        assert_eq!(
            reporter.entries()[0].context,
            "Checking if event needs update"
        );
    }
}
