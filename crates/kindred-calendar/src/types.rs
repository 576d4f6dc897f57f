//! Calendar API types and data structures.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use kindred_core::time::local_midnight;

/// Events created by Kindred get this palette entry.
pub const MOMENT_COLOR_ID: &str = "7";

/// Calendar event, normalized for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start/end came as plain dates; they hold local midnight.
    pub all_day: bool,
}

/// What to put on the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    /// One hour after `start` when absent
    pub end: Option<DateTime<Utc>>,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, description: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            start,
            end: None,
        }
    }

    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start + Duration::hours(1))
    }
}

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The server had no such event (404/410)
    AlreadyGone,
}

// API Request Types

/// Body of an events.insert call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub reminders: Reminders,
    pub color_id: String,
    pub transparency: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
}

impl EventResource {
    /// Private, busy, default reminders, times expressed in `tz`.
    pub fn from_new_event(event: &NewEvent, tz: &Tz) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            start: EventDateTime::new(event.start, tz),
            end: EventDateTime::new(event.effective_end(), tz),
            reminders: Reminders { use_default: true },
            color_id: MOMENT_COLOR_ID.to_string(),
            transparency: "opaque".to_string(),
            visibility: "private".to_string(),
        }
    }
}

impl EventDateTime {
    fn new(instant: DateTime<Utc>, tz: &Tz) -> Self {
        Self {
            date_time: instant
                .with_timezone(tz)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            time_zone: tz.name().to_string(),
        }
    }
}

// API Response Types

/// Google Calendar API event response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<ApiEventTime>,
    pub end: Option<ApiEventTime>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

/// API response for event list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    pub next_page_token: Option<String>,
}

impl ApiEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// The server-assigned id, if it is present and non-empty.
    pub fn event_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

impl CalendarEvent {
    /// Normalize an API event. Events without an id or a readable start
    /// are dropped.
    pub fn from_api(api: ApiEvent, tz: &Tz) -> Option<Self> {
        let id = api.event_id()?.to_string();
        let (start, all_day) = api.start.as_ref().and_then(|t| parse_event_time(t, tz))?;
        let end = api
            .end
            .as_ref()
            .and_then(|t| parse_event_time(t, tz))
            .map(|(end, _)| end)
            .unwrap_or(start);

        Some(Self {
            id,
            title: api.summary.unwrap_or_default(),
            description: api.description,
            start,
            end,
            all_day,
        })
    }
}

fn parse_event_time(api: &ApiEventTime, tz: &Tz) -> Option<(DateTime<Utc>, bool)> {
    if let Some(dt_str) = &api.date_time {
        if let Ok(dt) = DateTime::parse_from_rfc3339(dt_str) {
            return Some((dt.with_timezone(&Utc), false));
        }
    }
    if let Some(date_str) = &api.date {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            return Some((local_midnight(date, tz), true));
        }
    }
    tracing::debug!(?api, "Unreadable event time");
    None
}
