//! Identity keys and change detection.
//!
//! Calendars have no custom-ID field, so a record's identity key is written as the
//! first line of the event description. Everything here is a pure function of its
//! inputs except [`needs_update`], which reports unreadable events.

use crate::error::SyncResult;
use crate::event::{DestinationEvent, EventUpdate};
use crate::record::{CanonicalRecord, RECORD_SEPARATOR, Span};
use crate::report::ErrorReporter;

/// Derive the identity key for a source entity.
///
/// Only the immutable source ID goes in, never titles or times, so an activity
/// that is moved or renamed still maps to the same event.
pub fn compute_key(source_id: &str, key_prefix: &str) -> String {
    format!("{key_prefix}{source_id}")
}

/// The description persisted on the event: identity key, separator, body.
pub fn render_description(record: &CanonicalRecord) -> String {
    format!(
        "{}{}{}",
        record.identity_key(),
        RECORD_SEPARATOR,
        record.description_body
    )
}

/// The identity key on the first line of a persisted description.
pub fn embedded_key(description: &str) -> Option<&str> {
    let first_line = description.split(RECORD_SEPARATOR).next()?;
    (!first_line.is_empty()).then_some(first_line)
}

/// Whether `existing` has to be rewritten to match `desired`.
///
/// If the existing event cannot be read, the failure is recorded and the event
/// is left alone.
pub fn needs_update(
    existing: &DestinationEvent,
    desired: &CanonicalRecord,
    reporter: &ErrorReporter,
) -> bool {
    match differs(existing, desired) {
        Ok(changed) => changed,
        Err(e) => {
            reporter.record("Checking if event needs update", &e);
            false
        }
    }
}

fn differs(existing: &DestinationEvent, desired: &CanonicalRecord) -> SyncResult<bool> {
    if existing.title != desired.title
        || existing.description.as_deref() != Some(render_description(desired).as_str())
    {
        return Ok(true);
    }

    let changed = match (existing.timing()?, desired.span) {
        (Span::AllDay { date: current }, Span::AllDay { date: wanted }) => current != wanted,
        (
            Span::Timed { start, end },
            Span::Timed {
                start: wanted_start,
                end: wanted_end,
            },
        ) => start != wanted_start || end != wanted_end,
        // All-day vs timed: the event type itself has to change
        _ => true,
    };

    Ok(changed)
}

/// Fields to write when updating `existing` to `desired`.
///
/// All-day records keep the event's timing when it already sits on the right day;
/// otherwise the span is rewritten so that type and date mismatches converge.
pub fn build_update(existing: &DestinationEvent, desired: &CanonicalRecord) -> EventUpdate {
    let keep_timing = desired.is_all_day() && existing.timing().ok() == Some(desired.span);

    EventUpdate {
        title: desired.title.clone(),
        description: render_description(desired),
        color: desired.color,
        span: (!keep_timing).then_some(desired.span),
    }
}
