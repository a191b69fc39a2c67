//! Calendar stores that synced events are written to.
//!
//! A [`Destination`] wraps one calendar. All durable state lives in the calendar
//! itself, addressed through the identity key on the first description line.

mod google;
#[cfg(test)]
pub(crate) mod memory;

pub use google::{GoogleCalendar, GoogleCalendarFactory};

use crate::date_range::TimeWindow;
use crate::error::SyncResult;
use crate::event::{DestinationEvent, EventUpdate};
use crate::record::CanonicalRecord;

/// A single calendar-like store.
///
/// Every mutating call may fail transiently and must hand the failure back to
/// the caller so it can be attributed to the operation that caused it.
#[allow(async_fn_in_trait)]
pub trait Destination {
    /// Stable identity of the store (e.g. the calendar ID).
    fn id(&self) -> &str;

    /// All events overlapping `window`.
    async fn search(&self, window: &TimeWindow) -> SyncResult<Vec<DestinationEvent>>;

    async fn create(&self, record: &CanonicalRecord) -> SyncResult<DestinationEvent>;

    async fn update(&self, event: &DestinationEvent, update: &EventUpdate) -> SyncResult<()>;

    async fn delete(&self, event: &DestinationEvent) -> SyncResult<()>;
}

/// Opens destinations by ID, for records routed away from the default calendar.
#[allow(async_fn_in_trait)]
pub trait DestinationFactory {
    type Destination: Destination;

    /// Fails with [`crate::error::SyncError::DestinationNotFound`] when `id` does not exist.
    async fn open(&self, id: &str) -> SyncResult<Self::Destination>;
}
