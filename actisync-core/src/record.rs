//! Canonical activity records: the only input the reconciliation engine accepts.
//!
//! Sources map their API payloads into [`CanonicalRecord`]s. Validation happens once,
//! in [`CanonicalRecord::new`], so the engine never sees partially-shaped data.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Separates the identity key from the body in a persisted event description.
pub const RECORD_SEPARATOR: char = '\n';

/// When an activity happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Span {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllDay {
        date: NaiveDate,
    },
}

impl Span {
    pub fn is_all_day(&self) -> bool {
        matches!(self, Span::AllDay { .. })
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Span::Timed { start, .. } => Some(*start),
            Span::AllDay { .. } => None,
        }
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Span::Timed { end, .. } => Some(*end),
            Span::AllDay { .. } => None,
        }
    }
}

/// Google Calendar event colors, in `colorId` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTag {
    PaleBlue,
    PaleGreen,
    Mauve,
    PaleRed,
    Yellow,
    Orange,
    Cyan,
    #[default]
    Gray,
    Blue,
    Green,
    Red,
}

impl ColorTag {
    const ALL: [ColorTag; 11] = [
        ColorTag::PaleBlue,
        ColorTag::PaleGreen,
        ColorTag::Mauve,
        ColorTag::PaleRed,
        ColorTag::Yellow,
        ColorTag::Orange,
        ColorTag::Cyan,
        ColorTag::Gray,
        ColorTag::Blue,
        ColorTag::Green,
        ColorTag::Red,
    ];

    /// The `colorId` used by the Google Calendar API ("1" to "11").
    pub fn color_id(self) -> String {
        (self as usize + 1).to_string()
    }

    pub fn from_color_id(id: &str) -> Option<Self> {
        let index: usize = id.parse().ok()?;
        Self::ALL.get(index.checked_sub(1)?).copied()
    }
}

/// A normalized activity ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    identity_key: String,
    pub title: String,
    pub span: Span,
    /// User-facing notes. Never contains the identity key.
    pub description_body: String,
    pub color: ColorTag,
}

impl CanonicalRecord {
    pub fn new(
        identity_key: String,
        title: String,
        span: Span,
        description_body: String,
        color: ColorTag,
    ) -> SyncResult<Self> {
        if identity_key.is_empty() {
            return Err(SyncError::InvalidRecord(format!(
                "empty identity key for '{}'",
                title
            )));
        }

        if identity_key.contains(RECORD_SEPARATOR) {
            return Err(SyncError::InvalidRecord(format!(
                "identity key for '{}' contains a line break",
                title
            )));
        }

        if let Span::Timed { start, end } = span {
            if start > end {
                return Err(SyncError::InvalidRecord(format!(
                    "'{}' ends before it starts ({} > {})",
                    title, start, end
                )));
            }
        }

        Ok(CanonicalRecord {
            identity_key,
            title,
            span,
            description_body,
            color,
        })
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    pub fn is_all_day(&self) -> bool {
        self.span.is_all_day()
    }
}

impl fmt::Display for CanonicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}
