//! Google Calendar REST client.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::instrument;

use kindred_core::RemoteCallError;

use crate::error::network_error;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{ApiEvent, DeleteOutcome, EventListResponse, EventResource};

/// Recurring events are expanded server side, so a page can be long.
const PAGE_SIZE: u32 = 250;

pub struct CalendarClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl CalendarClient {
    /// `base_url` is the REST root, e.g. `https://www.googleapis.com/calendar/v3`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.base_url, urlencoding::encode(calendar_id))
    }

    /// List one page of events within a time range.
    #[instrument(skip(self, token), level = "info")]
    pub async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, RemoteCallError> {
        let mut url = format!(
            "{}?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults={}",
            self.events_url(calendar_id),
            urlencoding::encode(&time_min.to_rfc3339()),
            urlencoding::encode(&time_max.to_rfc3339()),
            PAGE_SIZE,
        );

        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
        }

        let response = with_retry(&self.retry, || self.client.get(&url).bearer_auth(token).send())
            .await
            .map_err(network_error)?;

        handle_response(response).await
    }

    /// Create an event. Not retried: a repeat could create a duplicate.
    #[instrument(skip(self, token, event), level = "info")]
    pub async fn insert_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &EventResource,
    ) -> Result<ApiEvent, RemoteCallError> {
        let response = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(token)
            .json(event)
            .send()
            .await
            .map_err(network_error)?;

        handle_response(response).await
    }

    /// Delete an event. A missing event is not an error.
    #[instrument(skip(self, token), level = "info")]
    pub async fn delete_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<DeleteOutcome, RemoteCallError> {
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));

        let response = with_retry(&self.retry, || self.client.delete(&url).bearer_auth(token).send())
            .await
            .map_err(network_error)?;

        // 204 No Content on success
        match response.status() {
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::info!(event_id, "Event was already deleted");
                Ok(DeleteOutcome::AlreadyGone)
            }
            _ => Err(status_error(response).await),
        }
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RemoteCallError> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|e| RemoteCallError::Malformed(format!("JSON parse error: {}", e)))
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: reqwest::Response) -> RemoteCallError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => RemoteCallError::TokenExpired,
        StatusCode::FORBIDDEN => RemoteCallError::Forbidden(response.text().await.unwrap_or_default()),
        StatusCode::NOT_FOUND => RemoteCallError::NotFound(response.text().await.unwrap_or_default()),
        StatusCode::CONFLICT => RemoteCallError::Conflict,
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            RemoteCallError::RateLimited(retry_after)
        }
        _ => {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "Calendar API error");
            RemoteCallError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }
}
