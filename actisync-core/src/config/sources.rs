//! Per-source configuration sections.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{DEFAULT_RATE_LIMIT, GOOGLE_FIT_API_BASE, TOGGL_API_BASE};
use crate::record::ColorTag;

/// `[toggl]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TogglConfig {
    pub enabled: bool,
    pub api_token: String,
    pub api_base: String,
    /// Minimum gap between two API requests.
    #[serde(with = "super::humantime_duration")]
    pub rate_limit: Duration,
    /// Entries shorter than this are not synced. Zero disables the filter.
    pub min_duration_minutes: i64,
    /// When non-empty, only entries carrying at least one of these tags are synced.
    pub filter_by_tags: Vec<String>,
    pub include_project_in_title: bool,
    pub include_tags_in_title: bool,
    pub include_notes_in_description: bool,
    pub color: ColorTag,
    /// Tag name to calendar ID. Checked before `project_calendar_map`.
    pub tag_calendar_map: HashMap<String, String>,
    /// Project name to calendar ID.
    pub project_calendar_map: HashMap<String, String>,
}

impl Default for TogglConfig {
    fn default() -> Self {
        TogglConfig {
            enabled: true,
            api_token: String::new(),
            api_base: TOGGL_API_BASE.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            min_duration_minutes: 1,
            filter_by_tags: Vec::new(),
            include_project_in_title: true,
            include_tags_in_title: false,
            include_notes_in_description: true,
            color: ColorTag::Orange,
            tag_calendar_map: HashMap::new(),
            project_calendar_map: HashMap::new(),
        }
    }
}

impl TogglConfig {
    /// Calendar a tag routes to. Tag names match case-insensitively.
    pub fn calendar_for_tag(&self, tag: &str) -> Option<&str> {
        lookup(&self.tag_calendar_map, tag)
    }

    /// Calendar a project routes to. Project names match case-insensitively.
    pub fn calendar_for_project(&self, project: &str) -> Option<&str> {
        lookup(&self.project_calendar_map, project)
    }

    /// Every calendar some tag or project routes to, deduplicated and sorted.
    pub fn routed_calendars(&self) -> Vec<String> {
        self.tag_calendar_map
            .values()
            .chain(self.project_calendar_map.values())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn lookup<'a>(map: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    map.get(name)
        .or_else(|| {
            map.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, id)| id)
        })
        .map(String::as_str)
}

/// `[google_fit]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleFitConfig {
    pub enabled: bool,
    /// Falls back to `google_calendar.access_token` when empty.
    pub access_token: String,
    pub api_base: String,
    #[serde(with = "super::humantime_duration")]
    pub rate_limit: Duration,
    pub steps: StepsConfig,
    pub sleep: SleepConfig,
    pub workouts: WorkoutsConfig,
}

impl Default for GoogleFitConfig {
    fn default() -> Self {
        GoogleFitConfig {
            enabled: true,
            access_token: String::new(),
            api_base: GOOGLE_FIT_API_BASE.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            steps: StepsConfig::default(),
            sleep: SleepConfig::default(),
            workouts: WorkoutsConfig::default(),
        }
    }
}

/// `[google_fit.steps]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
    pub enabled: bool,
    pub min_steps: u64,
    pub data_source_id: String,
    pub color: ColorTag,
}

impl Default for StepsConfig {
    fn default() -> Self {
        StepsConfig {
            enabled: true,
            min_steps: 1000,
            data_source_id:
                "derived:com.google.step_count.delta:com.google.android.gms:estimated_steps"
                    .to_string(),
            color: ColorTag::Green,
        }
    }
}

/// `[google_fit.sleep]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    pub enabled: bool,
    pub min_duration_hours: f64,
    pub color: ColorTag,
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            enabled: true,
            min_duration_hours: 1.0,
            color: ColorTag::Mauve,
        }
    }
}

/// `[google_fit.workouts]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkoutsConfig {
    pub enabled: bool,
    pub min_duration_minutes: i64,
    pub color: ColorTag,
}

impl Default for WorkoutsConfig {
    fn default() -> Self {
        WorkoutsConfig {
            enabled: true,
            min_duration_minutes: 10,
            color: ColorTag::Red,
        }
    }
}
