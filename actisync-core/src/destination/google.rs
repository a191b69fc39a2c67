//! Google Calendar v3 REST destination.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::date_range::TimeWindow;
use crate::error::{SyncError, SyncResult};
use crate::event::{DestinationEvent, EventTime, EventUpdate, span_to_times};
use crate::identity::render_description;
use crate::record::{CanonicalRecord, ColorTag};

use super::{Destination, DestinationFactory};

/// Upper bound the API accepts for `maxResults`.
const PAGE_SIZE: &str = "2500";

/// Both fields are always serialized: patching a timed event into an all-day one
/// only works when the other field is explicitly cleared with `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date_time: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
}

impl From<EventTime> for GoogleTime {
    fn from(time: EventTime) -> Self {
        match time {
            EventTime::DateTime(dt) => GoogleTime {
                date_time: Some(dt),
                date: None,
            },
            EventTime::Date(d) => GoogleTime {
                date_time: None,
                date: Some(d),
            },
        }
    }
}

impl GoogleTime {
    fn to_event_time(&self) -> Option<EventTime> {
        self.date_time
            .map(EventTime::DateTime)
            .or(self.date.map(EventTime::Date))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    #[serde(default, skip_serializing)]
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<GoogleTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<GoogleTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    #[serde(default, skip_serializing)]
    status: Option<String>,
}

impl From<GoogleEvent> for DestinationEvent {
    fn from(event: GoogleEvent) -> Self {
        DestinationEvent {
            id: event.id,
            title: event.summary.unwrap_or_default(),
            description: event.description,
            start: event.start.as_ref().and_then(GoogleTime::to_event_time),
            end: event.end.as_ref().and_then(GoogleTime::to_event_time),
            color: event.color_id.as_deref().and_then(ColorTag::from_color_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

/// Connection details shared by every calendar opened from one account.
#[derive(Debug, Clone)]
struct Connection {
    http: reqwest::Client,
    api_base: Url,
    access_token: String,
}

impl Connection {
    /// Build `<api_base>/<segments...>`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Config(format!("Invalid API base URL: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&GoogleEvent>,
    ) -> SyncResult<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

async fn api_error(response: reqwest::Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SyncError::Api { status, body }
}

/// One Google calendar, addressed by its calendar ID.
#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    connection: Connection,
    calendar_id: String,
}

impl GoogleCalendar {
    fn events_url(&self) -> SyncResult<Url> {
        self.connection
            .url(&["calendars", &self.calendar_id, "events"])
    }

    fn event_url(&self, event_id: &str) -> SyncResult<Url> {
        self.connection
            .url(&["calendars", &self.calendar_id, "events", event_id])
    }

    fn body_for(record: &CanonicalRecord) -> GoogleEvent {
        let (start, end) = span_to_times(record.span);
        GoogleEvent {
            summary: Some(record.title.clone()),
            description: Some(render_description(record)),
            start: Some(start.into()),
            end: Some(end.into()),
            color_id: Some(record.color.color_id()),
            ..Default::default()
        }
    }
}

impl Destination for GoogleCalendar {
    fn id(&self) -> &str {
        &self.calendar_id
    }

    async fn search(&self, window: &TimeWindow) -> SyncResult<Vec<DestinationEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.events_url()?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &window.start.to_rfc3339())
                    .append_pair("timeMax", &window.end.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("maxResults", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.connection.send(Method::GET, url, None).await?;
            if !response.status().is_success() {
                return Err(api_error(response).await);
            }

            let page: GoogleEventList = response.json().await?;
            events.extend(
                page.items
                    .into_iter()
                    .filter(|e| e.status.as_deref() != Some("cancelled") && !e.id.is_empty())
                    .map(DestinationEvent::from),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }

    async fn create(&self, record: &CanonicalRecord) -> SyncResult<DestinationEvent> {
        let body = Self::body_for(record);
        let response = self
            .connection
            .send(Method::POST, self.events_url()?, Some(&body))
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let created: GoogleEvent = response.json().await?;
        Ok(created.into())
    }

    async fn update(&self, event: &DestinationEvent, update: &EventUpdate) -> SyncResult<()> {
        let mut body = GoogleEvent {
            summary: Some(update.title.clone()),
            description: Some(update.description.clone()),
            color_id: Some(update.color.color_id()),
            ..Default::default()
        };
        if let Some(span) = update.span {
            let (start, end) = span_to_times(span);
            body.start = Some(start.into());
            body.end = Some(end.into());
        }

        let response = self
            .connection
            .send(Method::PATCH, self.event_url(&event.id)?, Some(&body))
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn delete(&self, event: &DestinationEvent) -> SyncResult<()> {
        let response = self
            .connection
            .send(Method::DELETE, self.event_url(&event.id)?, None)
            .await?;

        match response.status() {
            // Already gone
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(api_error(response).await),
        }
    }
}

/// Opens calendars of one Google account.
#[derive(Debug, Clone)]
pub struct GoogleCalendarFactory {
    connection: Connection,
}

impl GoogleCalendarFactory {
    pub fn new(api_base: &str, access_token: &str) -> SyncResult<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| SyncError::Config(format!("Invalid API base URL '{}': {}", api_base, e)))?;

        Ok(GoogleCalendarFactory {
            connection: Connection {
                http: reqwest::Client::new(),
                api_base,
                access_token: access_token.to_string(),
            },
        })
    }
}

impl DestinationFactory for GoogleCalendarFactory {
    type Destination = GoogleCalendar;

    /// Checks the calendar exists and is accessible before handing it out.
    async fn open(&self, id: &str) -> SyncResult<GoogleCalendar> {
        let url = self.connection.url(&["calendars", id])?;
        let response = self.connection.send(Method::GET, url, None).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(SyncError::DestinationNotFound(id.to_string())),
            status if status.is_success() => Ok(GoogleCalendar {
                connection: self.connection.clone(),
                calendar_id: id.to_string(),
            }),
            _ => Err(api_error(response).await),
        }
    }
}
