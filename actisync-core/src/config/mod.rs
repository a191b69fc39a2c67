//! actisync configuration.
//!
//! Read from `~/.config/actisync/config.toml`. Any value can be overridden from the
//! environment with an `ACTISYNC__` prefix and `__` between sections, e.g.
//! `ACTISYNC__TOGGL__API_TOKEN`.

pub mod humantime_duration;
mod sources;

pub use sources::{GoogleFitConfig, SleepConfig, StepsConfig, TogglConfig, WorkoutsConfig};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_DAYS_TO_SYNC, GOOGLE_CALENDAR_API_BASE};
use crate::date_range::TimeWindow;
use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "ACTISYNC";

/// `[google_calendar]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleCalendarConfig {
    pub access_token: String,
    pub api_base: String,
}

impl Default for GoogleCalendarConfig {
    fn default() -> Self {
        GoogleCalendarConfig {
            access_token: String::new(),
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Calendar that receives every record not routed elsewhere.
    pub calendar_id: String,
    /// Zone used for day boundaries (sync window, all-day records).
    pub timezone: Tz,
    pub days_to_sync: i64,
    /// Decide everything but write nothing.
    pub dry_run: bool,
    /// Pending operations per destination before an automatic flush.
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub google_calendar: GoogleCalendarConfig,
    pub toggl: TogglConfig,
    pub google_fit: GoogleFitConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            calendar_id: String::new(),
            timezone: Tz::UTC,
            days_to_sync: DEFAULT_DAYS_TO_SYNC,
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            google_calendar: GoogleCalendarConfig::default(),
            toggl: TogglConfig::default(),
            google_fit: GoogleFitConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("actisync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load `path` (if it exists) and apply environment overrides.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("toggl.filter_by_tags");

        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(environment)
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Check that every required value is present.
    ///
    /// All missing fields are reported together in one [`SyncError::MissingConfig`].
    pub fn validate(&self) -> SyncResult<()> {
        let mut missing = Vec::new();

        if self.calendar_id.trim().is_empty() {
            missing.push("calendar_id".to_string());
        }
        if self.google_calendar.access_token.trim().is_empty() {
            missing.push("google_calendar.access_token".to_string());
        }
        if self.toggl.enabled && self.toggl.api_token.trim().is_empty() {
            missing.push("toggl.api_token".to_string());
        }
        if self.google_fit.enabled && self.fit_access_token().trim().is_empty() {
            missing.push("google_fit.access_token".to_string());
        }

        if !missing.is_empty() {
            return Err(SyncError::MissingConfig(missing));
        }

        if self.days_to_sync <= 0 {
            return Err(SyncError::Config(format!(
                "days_to_sync must be positive, got {}",
                self.days_to_sync
            )));
        }

        Ok(())
    }

    /// Token for the Fitness API; shares the calendar token unless set separately.
    pub fn fit_access_token(&self) -> &str {
        if self.google_fit.access_token.is_empty() {
            &self.google_calendar.access_token
        } else {
            &self.google_fit.access_token
        }
    }

    /// The window of source data a run covers, ending today in the configured zone.
    pub fn sync_window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::for_last_days(self.days_to_sync, self.timezone, now)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# actisync configuration

# Calendar that receives synced events (required):
# calendar_id = \"you@gmail.com\"

# timezone = \"Europe/Amsterdam\"
# days_to_sync = {DEFAULT_DAYS_TO_SYNC}
# batch_size = {DEFAULT_BATCH_SIZE}
# dry_run = false

# [retry]
# max_attempts = 3
# base_delay = \"1s\"

[google_calendar]
# OAuth access token with the calendar scope (required):
# access_token = \"\"

[toggl]
# enabled = true
# api_token = \"\"
# min_duration_minutes = 1
# filter_by_tags = [\"billable\"]
# include_project_in_title = true
# include_tags_in_title = false
# include_notes_in_description = true
# color = \"orange\"

# Route entries to other calendars by tag (checked first) or project name:
# [toggl.tag_calendar_map]
# deep-work = \"focus@group.calendar.google.com\"
# [toggl.project_calendar_map]
# \"Side Project\" = \"side@group.calendar.google.com\"

[google_fit]
# enabled = true
# Defaults to the google_calendar token:
# access_token = \"\"

# [google_fit.steps]
# enabled = true
# min_steps = 1000
# color = \"green\"

# [google_fit.sleep]
# enabled = true
# min_duration_hours = 1
# color = \"mauve\"

# [google_fit.workouts]
# enabled = true
# min_duration_minutes = 10
# color = \"red\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
