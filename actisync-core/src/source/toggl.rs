//! Toggl Track time entries.

use std::collections::HashMap;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::TogglConfig;
use crate::date_range::TimeWindow;
use crate::destination::DestinationFactory;
use crate::error::SyncResult;
use crate::http::{ApiClient, RequestOptions};
use crate::identity::compute_key;
use crate::pool::EnginePool;
use crate::record::{CanonicalRecord, Span};
use crate::report::ErrorReporter;

use super::{RoutedRecord, Source, format_hours_minutes, run_pass};

pub const TOGGL_PREFIX: &str = "toggl-id:";

const NO_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, Deserialize)]
struct TimeEntry {
    id: u64,
    #[serde(default)]
    description: Option<String>,
    start: DateTime<Utc>,
    #[serde(default)]
    stop: Option<DateTime<Utc>>,
    #[serde(default)]
    project_id: Option<u64>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl TimeEntry {
    fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    fn description(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION)
    }

    fn duration(&self) -> Option<Duration> {
        self.stop.map(|stop| stop - self.start)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Project {
    id: u64,
    name: String,
}

pub struct TogglSource {
    config: TogglConfig,
    client: ApiClient,
}

impl TogglSource {
    pub fn new(config: TogglConfig) -> Self {
        let client = ApiClient::new(&config.api_base)
            .with_basic_auth(&config.api_token, "api_token")
            .with_rate_limit(config.rate_limit);

        TogglSource { config, client }
    }

    async fn fetch_entries(&mut self, window: &TimeWindow) -> SyncResult<Vec<TimeEntry>> {
        let endpoint = format!(
            "/me/time_entries?start_date={}&end_date={}",
            window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            window.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.client.fetch(&endpoint, &RequestOptions::get()).await
    }

    /// Projects by ID. A failed fetch is recorded and yields no projects.
    async fn fetch_projects(&mut self, reporter: &ErrorReporter) -> HashMap<u64, Project> {
        match self
            .client
            .fetch::<Vec<Project>>("/me/projects", &RequestOptions::get())
            .await
        {
            Ok(projects) => projects.into_iter().map(|p| (p.id, p)).collect(),
            Err(e) => {
                reporter.record("Fetching Toggl projects", &e);
                HashMap::new()
            }
        }
    }

    fn needs_projects(&self) -> bool {
        self.config.include_project_in_title || !self.config.project_calendar_map.is_empty()
    }

    fn keep(&self, entry: &TimeEntry) -> bool {
        let filter = &self.config.filter_by_tags;
        if !filter.is_empty() && !entry.tags().iter().any(|tag| filter.contains(tag)) {
            return false;
        }

        if self.config.min_duration_minutes > 0 {
            return entry
                .duration()
                .is_some_and(|d| d >= Duration::minutes(self.config.min_duration_minutes));
        }

        true
    }

    /// The record for a finished entry. Running entries (no stop yet) yield `None`.
    fn build_record(
        &self,
        entry: &TimeEntry,
        projects: &HashMap<u64, Project>,
    ) -> SyncResult<Option<RoutedRecord>> {
        let Some(stop) = entry.stop else {
            tracing::debug!("Skipping running entry: {}", entry.description());
            return Ok(None);
        };

        let description = entry.description();
        let project = entry.project_id.and_then(|id| projects.get(&id));
        let tags = entry.tags().join(", ");

        let mut title = description.to_string();
        if let Some(project) = project.filter(|_| self.config.include_project_in_title) {
            title = format!("[{}] {}", project.name, title);
        }
        if self.config.include_tags_in_title && !tags.is_empty() {
            title = format!("{} ({})", title, tags);
        }

        let mut body = String::new();
        if let Some(project_id) = entry.project_id {
            body.push_str(&format!("Project ID: {project_id}\n"));
        }
        if let Some(project) = project {
            body.push_str(&format!("Project Name: {}\n", project.name));
        }
        if !tags.is_empty() {
            body.push_str(&format!("Tags: {tags}\n"));
        }
        if self.config.include_notes_in_description && description != NO_DESCRIPTION {
            body.push_str(&format!("Notes: {description}\n"));
        }
        body.push_str(&format!(
            "Duration: {}\n",
            format_hours_minutes(stop - entry.start)
        ));

        let record = CanonicalRecord::new(
            compute_key(&entry.id.to_string(), TOGGL_PREFIX),
            title,
            Span::Timed {
                start: entry.start,
                end: stop,
            },
            body,
            self.config.color,
        )?;

        Ok(Some(RoutedRecord {
            target: self.route(entry, project),
            record,
        }))
    }

    /// Tag mappings win over the project mapping; the first mapped tag decides.
    fn route(&self, entry: &TimeEntry, project: Option<&Project>) -> Option<String> {
        entry
            .tags()
            .iter()
            .find_map(|tag| self.config.calendar_for_tag(tag))
            .or_else(|| project.and_then(|p| self.config.calendar_for_project(&p.name)))
            .map(str::to_string)
    }
}

impl Source for TogglSource {
    fn name(&self) -> &str {
        "Toggl"
    }

    async fn sync<F: DestinationFactory>(
        &mut self,
        pool: &mut EnginePool<F>,
        window: TimeWindow,
    ) -> usize {
        if !self.config.enabled {
            tracing::info!("Toggl sync disabled");
            return 0;
        }

        let reporter = pool.reporter().clone();

        let entries = match self.fetch_entries(&window).await {
            Ok(entries) => entries,
            Err(e) => {
                reporter.record("Fetching Toggl entries", &e);
                return 0;
            }
        };
        tracing::debug!("Fetched {} Toggl entries", entries.len());

        let projects = if self.needs_projects() {
            self.fetch_projects(&reporter).await
        } else {
            HashMap::new()
        };

        let records = entries
            .iter()
            .filter(|entry| self.keep(entry))
            .filter_map(|entry| match self.build_record(entry, &projects) {
                Ok(record) => record,
                Err(e) => {
                    reporter.record(
                        format!("Building event data for Toggl entry {}", entry.id),
                        &e,
                    );
                    None
                }
            })
            .collect();

        let routed = self.config.routed_calendars();
        let synced = run_pass(pool, TOGGL_PREFIX, window, &routed, records).await;
        tracing::debug!("Toggl requests made: {}", self.client.request_count());
        synced
    }
}
