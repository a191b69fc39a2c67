//! Shared constants.

use std::time::Duration;

/// Number of past days synced when no explicit window is configured.
pub const DEFAULT_DAYS_TO_SYNC: i64 = 7;

/// Pending operations per destination before the batcher flushes.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Buffer added on both sides of a record's span when searching for its event.
/// Guards against calendars indexing events by slightly different boundaries.
pub const SEARCH_BUFFER_HOURS: i64 = 48;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Minimum spacing between two requests to the same API.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// How long a successful API response may be served from cache.
pub const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(300);

pub const TOGGL_API_BASE: &str = "https://api.track.toggl.com/api/v9";
pub const GOOGLE_FIT_API_BASE: &str = "https://www.googleapis.com/fitness/v1";
pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
