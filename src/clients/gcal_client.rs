use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::CalendarSettings;
use crate::error::{CalendarError, ConfigError};
use crate::models::event::CalendarEvent;
use crate::service::calendar_service::CalendarSource;

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleEvent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transparency: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attendee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "responseStatus", default)]
    pub response_status: Option<String>,
}

impl GoogleEvent {
    fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("Untitled Event")
    }
}

/// Whether an event should drive the light. Drops all-day, cancelled,
/// declined and transparent (free) entries. The calendar id doubles as the
/// owner's attendee email.
pub fn is_relevant(event: &GoogleEvent, calendar_id: &str) -> bool {
    let timed = event
        .start
        .as_ref()
        .is_some_and(|start| start.date_time.is_some());
    if !timed {
        debug!("Skipping all-day event: {}", event.title());
        return false;
    }
    if event.status.as_deref() == Some("cancelled") {
        debug!("Skipping cancelled event: {}", event.title());
        return false;
    }
    let declined = event.attendees.iter().any(|attendee| {
        attendee.email.as_deref() == Some(calendar_id)
            && attendee.response_status.as_deref() == Some("declined")
    });
    if declined {
        debug!("Skipping declined event: {}", event.title());
        return false;
    }
    if event.transparency.as_deref() == Some("transparent") {
        debug!("Skipping transparent event: {}", event.title());
        return false;
    }
    true
}

pub fn to_calendar_event(event: &GoogleEvent) -> CalendarEvent {
    let parse = |time: Option<&EventTime>| -> Option<DateTime<Utc>> {
        let raw = time?.date_time.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(err) => {
                warn!("Failed to parse event time '{}': {}", raw, err);
                None
            }
        }
    };
    CalendarEvent {
        title: event.title().to_string(),
        start: parse(event.start.as_ref()),
        end: parse(event.end.as_ref()),
    }
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_key: String,
    calendar_id: String,
    api_url: String,
}

impl GoogleCalendarClient {
    pub fn new(api_key: &str, calendar_id: &str, api_url: &str, timeout: Duration) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            calendar_id: calendar_id.to_string(),
            api_url: api_url.to_string(),
        })
    }

    pub fn from_settings(settings: &CalendarSettings) -> Result<Self, anyhow::Error> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("GOOGLE_API_KEY".to_string()))?;
        let calendar_id = settings
            .calendar_id
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("GOOGLE_CALENDAR_ID".to_string()))?;
        Ok(Self::new(api_key, calendar_id, &settings.api_url, settings.timeout)?)
    }

    fn events_url(&self) -> Result<reqwest::Url, CalendarError> {
        let mut url = reqwest::Url::parse(&self.api_url).map_err(|e| CalendarError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::Url(format!("{} cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"]);
        Ok(url)
    }

    /// Upcoming timed events starting from `now`, filtered and capped at
    /// `max_results`. Twice as many are requested to leave room for filtering.
    pub async fn fetch_events(&self, now: DateTime<Utc>, max_results: usize) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = self.events_url()?;
        debug!("Fetching calendar events from Google Calendar API");
        let response = self
            .http
            .get(url)
            .query(&[
                ("key", self.api_key.clone()),
                ("timeMin", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("maxResults", (max_results * 2).to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        match status {
            200 => {}
            401 => error!("Google Calendar API authentication failed. Check your API key."),
            403 => error!("Google Calendar API access forbidden. Check calendar ID and API permissions."),
            404 => error!("Calendar not found. Check your GOOGLE_CALENDAR_ID setting."),
            _ => error!("Failed to get calendar events: HTTP {} - {}", status, text),
        }
        if status != 200 {
            return Err(CalendarError::Status { status, body: text });
        }

        let parsed: EventsResponse = serde_json::from_str(&text)?;
        let events: Vec<CalendarEvent> = parsed
            .items
            .iter()
            .filter(|event| is_relevant(event, &self.calendar_id))
            .take(max_results)
            .map(to_calendar_event)
            .collect();
        info!("Retrieved {} valid upcoming events", events.len());
        Ok(events)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn list_upcoming(&self, now: DateTime<Utc>, max_results: usize) -> Vec<CalendarEvent> {
        match self.fetch_events(now, max_results).await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "Google Calendar fetch failed");
                Vec::new()
            }
        }
    }
}
