//! Google Fit steps, sleep and workout sessions.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, SubsecRound, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::config::GoogleFitConfig;
use crate::date_range::TimeWindow;
use crate::destination::DestinationFactory;
use crate::error::SyncResult;
use crate::http::{ApiClient, RequestOptions};
use crate::identity::compute_key;
use crate::pool::EnginePool;
use crate::record::{CanonicalRecord, Span};
use crate::report::ErrorReporter;

use super::{RoutedRecord, Source, format_hours_minutes, run_pass};

pub const STEPS_PREFIX: &str = "google-fit-steps:";
pub const SLEEP_PREFIX: &str = "google-fit-sleep:";
pub const WORKOUT_PREFIX: &str = "google-fit-workout:";

const SLEEP_ACTIVITY_TYPE: i64 = 72;
const STEP_COUNT_DATA_TYPE: &str = "com.google.step_count.delta";
const DAY_MILLIS: i64 = 86_400_000;

/// Google encodes int64 values as JSON strings.
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    let ms = match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text.parse::<i64>().map_err(serde::de::Error::custom)?,
        Raw::Number(n) => n,
    };
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}")))
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    bucket: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bucket {
    #[serde(deserialize_with = "millis")]
    start_time_millis: DateTime<Utc>,
    #[serde(default)]
    dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    point: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[serde(default)]
    value: Vec<PointValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointValue {
    int_val: Option<i64>,
}

impl Bucket {
    fn total_steps(&self) -> u64 {
        let total: i64 = self
            .dataset
            .iter()
            .flat_map(|d| &d.point)
            .flat_map(|p| &p.value)
            .filter_map(|v| v.int_val)
            .sum();
        total.max(0) as u64
    }
}

#[derive(Debug, Deserialize)]
struct SessionList {
    #[serde(default)]
    session: Vec<Session>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(deserialize_with = "millis")]
    start_time_millis: DateTime<Utc>,
    #[serde(deserialize_with = "millis")]
    end_time_millis: DateTime<Utc>,
    #[serde(default)]
    activity_type: Option<i64>,
}

impl Session {
    fn duration(&self) -> Duration {
        self.end_time_millis - self.start_time_millis
    }

    fn is_sleep(&self) -> bool {
        self.activity_type == Some(SLEEP_ACTIVITY_TYPE)
    }

    /// Calendars store `dateTime` to the second; a millisecond span would never
    /// compare equal to the event read back.
    fn span(&self) -> Span {
        Span::Timed {
            start: self.start_time_millis.trunc_subsecs(0),
            end: self.end_time_millis.trunc_subsecs(0),
        }
    }
}

/// 12345 -> "12,345"
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// "1h 5m" from an hour up, "45m" below.
fn format_workout_duration(duration: Duration) -> String {
    if duration.num_minutes() >= 60 {
        format_hours_minutes(duration)
    } else {
        format!("{}m", duration.num_minutes().max(0))
    }
}

pub struct GoogleFitSource {
    config: GoogleFitConfig,
    timezone: Tz,
    client: ApiClient,
}

impl GoogleFitSource {
    pub fn new(config: GoogleFitConfig, access_token: &str, timezone: Tz) -> Self {
        let client = ApiClient::new(&config.api_base)
            .with_bearer_token(access_token)
            .with_rate_limit(config.rate_limit);

        GoogleFitSource {
            config,
            timezone,
            client,
        }
    }

    async fn fetch_step_buckets(&mut self, window: &TimeWindow) -> SyncResult<Vec<Bucket>> {
        let body = json!({
            "aggregateBy": [{
                "dataTypeName": STEP_COUNT_DATA_TYPE,
                "dataSourceId": self.config.steps.data_source_id,
            }],
            "bucketByTime": { "durationMillis": DAY_MILLIS },
            "startTimeMillis": window.start.timestamp_millis(),
            "endTimeMillis": window.end.timestamp_millis(),
        });

        let response: AggregateResponse = self
            .client
            .fetch("/users/me/dataset:aggregate", &RequestOptions::post(body))
            .await?;
        Ok(response.bucket)
    }

    async fn fetch_sessions(
        &mut self,
        window: &TimeWindow,
        activity_type: Option<i64>,
    ) -> SyncResult<Vec<Session>> {
        let mut endpoint = format!(
            "/users/me/sessions?startTime={}&endTime={}",
            window.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            window.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        if let Some(activity_type) = activity_type {
            endpoint.push_str(&format!("&activityType={activity_type}"));
        }

        let list: SessionList = self.client.fetch(&endpoint, &RequestOptions::get()).await?;
        Ok(list.session)
    }

    /// The local calendar day a bucket covers.
    fn bucket_date(&self, bucket: &Bucket) -> NaiveDate {
        // Midday is safe from DST shifts of the bucket boundaries
        (bucket.start_time_millis + Duration::hours(12))
            .with_timezone(&self.timezone)
            .date_naive()
    }

    fn step_records(&self, buckets: &[Bucket], reporter: &ErrorReporter) -> Vec<RoutedRecord> {
        let steps = &self.config.steps;

        buckets
            .iter()
            .filter_map(|bucket| {
                let total = bucket.total_steps();
                if total < steps.min_steps {
                    return None;
                }

                let date = self.bucket_date(bucket);
                let day = date.format("%Y-%m-%d").to_string();
                let count = group_thousands(total);

                let record = CanonicalRecord::new(
                    compute_key(&day, STEPS_PREFIX),
                    format!("🚶 {count} Steps"),
                    Span::AllDay { date },
                    format!("Steps: {count}\nDate: {day}"),
                    steps.color,
                );
                keep_valid(record, reporter, &day)
            })
            .collect()
    }

    fn sleep_records(&self, sessions: &[Session], reporter: &ErrorReporter) -> Vec<RoutedRecord> {
        let sleep = &self.config.sleep;
        let min_duration = Duration::seconds((sleep.min_duration_hours.max(0.0) * 3600.0) as i64);

        sessions
            .iter()
            .filter(|s| s.is_sleep() && s.duration() >= min_duration)
            .filter_map(|session| {
                let duration = format_hours_minutes(session.duration());
                let record = CanonicalRecord::new(
                    compute_key(&session.id, SLEEP_PREFIX),
                    format!("😴 Sleep: {duration}"),
                    session.span(),
                    format!(
                        "Duration: {duration}\nQuality: {}\nSession ID: {}",
                        session.name.as_deref().unwrap_or("Unknown"),
                        session.id
                    ),
                    sleep.color,
                );
                keep_valid(record, reporter, &session.id)
            })
            .collect()
    }

    fn workout_records(&self, sessions: &[Session], reporter: &ErrorReporter) -> Vec<RoutedRecord> {
        let workouts = &self.config.workouts;
        let min_duration = Duration::minutes(workouts.min_duration_minutes);

        sessions
            .iter()
            .filter(|s| !s.is_sleep() && s.duration() >= min_duration)
            .filter_map(|session| {
                let duration = format_workout_duration(session.duration());
                let record = CanonicalRecord::new(
                    compute_key(&session.id, WORKOUT_PREFIX),
                    format!(
                        "🏋️ {}: {duration}",
                        session.name.as_deref().unwrap_or("Workout")
                    ),
                    session.span(),
                    format!(
                        "Activity: {}\nDuration: {duration}\nSession ID: {}",
                        session.name.as_deref().unwrap_or("Unknown"),
                        session.id
                    ),
                    workouts.color,
                );
                keep_valid(record, reporter, &session.id)
            })
            .collect()
    }
}

fn keep_valid(
    record: SyncResult<CanonicalRecord>,
    reporter: &ErrorReporter,
    source_id: &str,
) -> Option<RoutedRecord> {
    match record {
        Ok(record) => Some(RoutedRecord::to_default(record)),
        Err(e) => {
            reporter.record(format!("Building event for Google Fit data {source_id}"), &e);
            None
        }
    }
}

impl Source for GoogleFitSource {
    fn name(&self) -> &str {
        "Google Fit"
    }

    async fn sync<F: DestinationFactory>(
        &mut self,
        pool: &mut EnginePool<F>,
        window: TimeWindow,
    ) -> usize {
        if !self.config.enabled {
            tracing::info!("Google Fit sync disabled");
            return 0;
        }

        let reporter = pool.reporter().clone();
        let mut synced = 0;

        if self.config.steps.enabled {
            match self.fetch_step_buckets(&window).await {
                Ok(buckets) => {
                    let records = self.step_records(&buckets, &reporter);
                    synced += run_pass(pool, STEPS_PREFIX, window, &[], records).await;
                }
                Err(e) => reporter.record("Syncing Google Fit steps", &e),
            }
        }

        if self.config.sleep.enabled {
            match self.fetch_sessions(&window, Some(SLEEP_ACTIVITY_TYPE)).await {
                Ok(sessions) => {
                    let records = self.sleep_records(&sessions, &reporter);
                    synced += run_pass(pool, SLEEP_PREFIX, window, &[], records).await;
                }
                Err(e) => reporter.record("Syncing Google Fit sleep", &e),
            }
        }

        if self.config.workouts.enabled {
            match self.fetch_sessions(&window, None).await {
                Ok(sessions) => {
                    let records = self.workout_records(&sessions, &reporter);
                    synced += run_pass(pool, WORKOUT_PREFIX, window, &[], records).await;
                }
                Err(e) => reporter.record("Syncing Google Fit workouts", &e),
            }
        }

        synced
    }
}
