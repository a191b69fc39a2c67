//! Destination-side event types.
//!
//! A [`DestinationEvent`] is a handle owned by a destination adapter. The engine only
//! reads it and hands it back to the adapter for updates and deletes.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::record::{ColorTag, RECORD_SEPARATOR, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

/// An event as stored in a calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub color: Option<ColorTag>,
}

impl DestinationEvent {
    /// Read the event's timing.
    ///
    /// Calendars hand back events with missing or mixed start/end kinds; those
    /// cannot be compared against a record and are reported as malformed.
    pub fn timing(&self) -> SyncResult<Span> {
        match (self.start, self.end) {
            (Some(EventTime::DateTime(start)), Some(EventTime::DateTime(end))) => {
                Ok(Span::Timed { start, end })
            }
            (Some(EventTime::Date(date)), Some(EventTime::Date(_))) => Ok(Span::AllDay { date }),
            (None, _) | (_, None) => Err(self.malformed("missing start or end")),
            _ => Err(self.malformed("start and end are of different kinds")),
        }
    }

    pub fn is_all_day(&self) -> SyncResult<bool> {
        Ok(self.timing()?.is_all_day())
    }

    /// The identity key embedded on the first line of the description, if any.
    pub fn embedded_key(&self) -> Option<&str> {
        self.description.as_deref().and_then(crate::identity::embedded_key)
    }

    fn malformed(&self, reason: &str) -> SyncError {
        SyncError::MalformedEvent {
            id: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for DestinationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Fields written to an existing event.
///
/// `span` is `None` when the event's timing is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpdate {
    pub title: String,
    pub description: String,
    pub color: ColorTag,
    pub span: Option<Span>,
}

impl EventUpdate {
    /// Apply this update to a local copy of an event.
    pub fn apply_to(&self, event: &mut DestinationEvent) {
        event.title = self.title.clone();
        event.description = Some(self.description.clone());
        event.color = Some(self.color);

        if let Some(span) = self.span {
            let (start, end) = span_to_times(span);
            event.start = Some(start);
            event.end = Some(end);
        }
    }
}

/// Destination start/end for a span. All-day events end on the following day (exclusive).
pub fn span_to_times(span: Span) -> (EventTime, EventTime) {
    match span {
        Span::Timed { start, end } => (EventTime::DateTime(start), EventTime::DateTime(end)),
        Span::AllDay { date } => (
            EventTime::Date(date),
            EventTime::Date(date.succ_opt().unwrap_or(date)),
        ),
    }
}

/// Whether a description starts with `prefix` on its first line.
pub(crate) fn description_has_prefix(description: &str, prefix: &str) -> bool {
    description
        .split(RECORD_SEPARATOR)
        .next()
        .is_some_and(|line| line.starts_with(prefix))
}
