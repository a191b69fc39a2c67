//! In-memory calendar used by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::date_range::{TimeWindow, start_of_day};
use crate::error::{SyncError, SyncResult};
use crate::event::{DestinationEvent, EventTime, EventUpdate, span_to_times};
use crate::identity::render_description;
use crate::record::CanonicalRecord;

use super::{Destination, DestinationFactory};

#[derive(Default)]
struct State {
    events: Vec<DestinationEvent>,
    next_id: usize,
    /// Mutating calls seen so far (create, update, delete).
    mutations: usize,
    searches: usize,
    /// 1-based mutation numbers that fail.
    failing_mutations: HashSet<usize>,
    fail_search: bool,
}

/// Clones share the same underlying calendar.
#[derive(Clone)]
pub struct MemoryCalendar {
    id: String,
    state: Arc<Mutex<State>>,
}

impl MemoryCalendar {
    pub fn new(id: &str) -> Self {
        MemoryCalendar {
            id: id.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Insert an event directly, bypassing the mutation counter.
    pub fn insert(&self, mut event: DestinationEvent) -> DestinationEvent {
        let mut state = self.state();
        state.next_id += 1;
        if event.id.is_empty() {
            event.id = format!("evt-{}", state.next_id);
        }
        state.events.push(event.clone());
        event
    }

    /// Insert the event that `create` would have produced for `record`.
    pub fn seed(&self, record: &CanonicalRecord) -> DestinationEvent {
        self.insert(event_for(String::new(), record))
    }

    pub fn events(&self) -> Vec<DestinationEvent> {
        self.state().events.clone()
    }

    pub fn event_with_key(&self, key: &str) -> Option<DestinationEvent> {
        self.events()
            .into_iter()
            .find(|e| e.embedded_key() == Some(key))
    }

    pub fn mutations(&self) -> usize {
        self.state().mutations
    }

    pub fn searches(&self) -> usize {
        self.state().searches
    }

    pub fn fail_mutation(&self, number: usize) {
        self.state().failing_mutations.insert(number);
    }

    pub fn fail_searches(&self) {
        self.state().fail_search = true;
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn begin_mutation(&self) -> SyncResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.mutations += 1;
        if state.failing_mutations.contains(&state.mutations) {
            return Err(SyncError::Api {
                status: 503,
                body: format!("mutation {} rejected", state.mutations),
            });
        }
        Ok(state)
    }
}

fn event_for(id: String, record: &CanonicalRecord) -> DestinationEvent {
    let (start, end) = span_to_times(record.span);
    DestinationEvent {
        id,
        title: record.title.clone(),
        description: Some(render_description(record)),
        start: Some(start),
        end: Some(end),
        color: Some(record.color),
    }
}

fn overlaps(event: &DestinationEvent, window: &TimeWindow) -> bool {
    let to_utc = |time: EventTime| match time {
        EventTime::DateTime(dt) => dt,
        EventTime::Date(date) => start_of_day(date, chrono_tz::Tz::UTC),
    };

    match (event.start, event.end) {
        (Some(start), Some(end)) => window.overlaps(to_utc(start), to_utc(end)),
        (Some(start), None) => window.overlaps(to_utc(start), to_utc(start)),
        _ => false,
    }
}

impl Destination for MemoryCalendar {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, window: &TimeWindow) -> SyncResult<Vec<DestinationEvent>> {
        let mut state = self.state();
        state.searches += 1;
        if state.fail_search {
            return Err(SyncError::Api {
                status: 500,
                body: "search failed".into(),
            });
        }

        Ok(state
            .events
            .iter()
            .filter(|e| overlaps(e, window))
            .cloned()
            .collect())
    }

    async fn create(&self, record: &CanonicalRecord) -> SyncResult<DestinationEvent> {
        let mut state = self.begin_mutation()?;
        state.next_id += 1;
        let event = event_for(format!("evt-{}", state.next_id), record);
        state.events.push(event.clone());
        Ok(event)
    }

    async fn update(&self, event: &DestinationEvent, update: &EventUpdate) -> SyncResult<()> {
        let mut state = self.begin_mutation()?;
        let stored = state
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| SyncError::Api {
                status: 404,
                body: format!("event {} not found", event.id),
            })?;
        update.apply_to(stored);
        Ok(())
    }

    async fn delete(&self, event: &DestinationEvent) -> SyncResult<()> {
        let mut state = self.begin_mutation()?;
        state.events.retain(|e| e.id != event.id);
        Ok(())
    }
}

/// Opens calendars registered up front; unknown IDs are not found.
#[derive(Clone, Default)]
pub struct MemoryFactory {
    calendars: Arc<Mutex<HashMap<String, MemoryCalendar>>>,
}

impl MemoryFactory {
    pub fn with_calendars(calendars: &[&MemoryCalendar]) -> Self {
        let map = calendars
            .iter()
            .map(|c| (c.id.clone(), (*c).clone()))
            .collect();
        MemoryFactory {
            calendars: Arc::new(Mutex::new(map)),
        }
    }
}

impl DestinationFactory for MemoryFactory {
    type Destination = MemoryCalendar;

    async fn open(&self, id: &str) -> SyncResult<MemoryCalendar> {
        self.calendars
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::DestinationNotFound(id.to_string()))
    }
}
