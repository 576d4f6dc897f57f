//! Authenticated calendar operations.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::instrument;

use kindred_auth::{AuthFlowError, CalendarAuthClient};
use kindred_core::{RemoteCallError, TimeWindow};

use crate::client::CalendarClient;
use crate::error::CalendarError;
use crate::retry::RetryConfig;
use crate::types::{CalendarEvent, DeleteOutcome, EventResource, NewEvent};

/// Guards against a server that keeps handing out page tokens.
const MAX_PAGES: usize = 40;

/// List, insert and delete on one calendar.
///
/// Every call makes sure the auth client is initialized, fetches a token
/// and then talks to the REST root that initialization discovered.
pub struct CalendarService {
    auth: Arc<CalendarAuthClient>,
    http: reqwest::Client,
    calendar_id: String,
    tz: Tz,
    retry: RetryConfig,
}

impl CalendarService {
    pub fn new(
        auth: Arc<CalendarAuthClient>,
        http: reqwest::Client,
        calendar_id: impl Into<String>,
        tz: Tz,
    ) -> Self {
        Self {
            auth,
            http,
            calendar_id: calendar_id.into(),
            tz,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn auth(&self) -> &Arc<CalendarAuthClient> {
        &self.auth
    }

    /// Events starting inside `window`, in chronological order.
    ///
    /// # Errors
    /// `CalendarError::Auth` when no token could be had, `Remote` when a
    /// page request failed.
    #[instrument(skip(self), fields(calendar_id = %self.calendar_id), level = "info")]
    pub async fn list_events(&self, window: TimeWindow) -> Result<Vec<CalendarEvent>, CalendarError> {
        let (client, token) = self.authorized().await?;

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = client
                .list_events(&token, &self.calendar_id, window.start, window.end, page_token.as_deref())
                .await;
            let page = self.observe(page)?;
            pages += 1;

            events.extend(
                page.items
                    .into_iter()
                    .filter(|api| !api.is_cancelled())
                    .filter_map(|api| CalendarEvent::from_api(api, &self.tz))
                    .filter(|event| window.contains(event.start)),
            );

            match page.next_page_token {
                Some(next) if pages < MAX_PAGES => page_token = Some(next),
                Some(_) => {
                    tracing::warn!("Stopped listing after {} pages", pages);
                    break;
                }
                None => break,
            }
        }

        events.sort_by_key(|event| event.start);
        tracing::info!(count = events.len(), pages, "Listed calendar events");
        Ok(events)
    }

    /// Create an event and return its server-assigned id.
    ///
    /// # Errors
    /// `Remote(Malformed)` if the response carries no id.
    #[instrument(skip(self, event), fields(title = %event.title), level = "info")]
    pub async fn insert_event(&self, event: NewEvent) -> Result<String, CalendarError> {
        let (client, token) = self.authorized().await?;
        let resource = EventResource::from_new_event(&event, &self.tz);

        let created = self.observe(client.insert_event(&token, &self.calendar_id, &resource).await)?;
        let id = created
            .event_id()
            .ok_or_else(|| RemoteCallError::Malformed("inserted event has no id".into()))?
            .to_string();

        tracing::info!(event_id = %id, "Calendar event created");
        Ok(id)
    }

    /// Delete an event. Deleting one that is already gone succeeds.
    #[instrument(skip(self), level = "info")]
    pub async fn delete_event(&self, event_id: &str) -> Result<DeleteOutcome, CalendarError> {
        let (client, token) = self.authorized().await?;
        self.observe(client.delete_event(&token, &self.calendar_id, event_id).await)
    }

    async fn authorized(&self) -> Result<(CalendarClient, String), CalendarError> {
        let info = self.auth.ensure_ready().await.map_err(AuthFlowError::from)?;
        let token = self.auth.access_token().await?;
        let client = CalendarClient::new(self.http.clone(), info.base_url).with_retry(self.retry.clone());
        Ok((client, token))
    }

    fn observe<T>(&self, result: Result<T, RemoteCallError>) -> Result<T, CalendarError> {
        result.map_err(|e| {
            if e == RemoteCallError::TokenExpired {
                tracing::warn!("Calendar rejected the access token; consent will be requested again");
                self.auth.invalidate_token();
            }
            CalendarError::Remote(e)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use kindred_auth::fake::{FailAt, FakeIdentitySdk};
    use kindred_auth::{AuthSettings, Prompt};
    use kindred_core::InitError;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> AuthSettings {
        AuthSettings {
            api_key: "key".into(),
            client_id: "client".into(),
            client_secret: None,
            discovery_doc: "https://example.test/discovery".into(),
            scope: "https://www.googleapis.com/auth/calendar.events".into(),
            redirect_port: 8085,
            load_timeout: Duration::from_secs(5),
            token_timeout: Duration::from_secs(5),
        }
    }

    fn service_with(sdk: Arc<FakeIdentitySdk>, tz: Tz) -> CalendarService {
        let auth = Arc::new(CalendarAuthClient::new(sdk, settings()));
        CalendarService::new(auth, reqwest::Client::new(), "primary", tz)
            .with_retry(RetryConfig::none())
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_list_events_filters_to_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer fake-token-1"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "id": "inside", "summary": "Dinner",
                      "start": {"dateTime": "2024-02-06T19:00:00Z"},
                      "end": {"dateTime": "2024-02-06T21:00:00Z"} },
                    { "id": "started-before", "summary": "Trip",
                      "start": {"dateTime": "2024-02-03T10:00:00Z"},
                      "end": {"dateTime": "2024-02-05T10:00:00Z"} },
                    { "id": "cancelled", "status": "cancelled",
                      "start": {"dateTime": "2024-02-07T10:00:00Z"} }
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "id": "all-day", "summary": "Anniversary", "start": {"date": "2024-02-05"} },
                    { "id": "at-end", "summary": "Next week",
                      "start": {"dateTime": "2024-02-11T00:00:00Z"} }
                ]
            })))
            .mount(&server)
            .await;

        let service = service_with(Arc::new(FakeIdentitySdk::new(server.uri())), Tz::UTC);
        let window = TimeWindow::new(utc(2024, 2, 4, 0, 0), utc(2024, 2, 11, 0, 0));

        let events = service.list_events(window).await.unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["all-day", "inside"]);
        assert!(events[0].all_day);
        assert_eq!(events[0].start, utc(2024, 2, 5, 0, 0));
    }

    #[tokio::test]
    async fn test_insert_event_returns_id_and_defaults_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(serde_json::json!({
                "start": { "dateTime": "2024-06-01T10:00:00+00:00", "timeZone": "UTC" },
                "end": { "dateTime": "2024-06-01T11:00:00+00:00", "timeZone": "UTC" },
                "transparency": "opaque",
                "visibility": "private"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "evt-42" })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_with(Arc::new(FakeIdentitySdk::new(server.uri())), Tz::UTC);
        let id = service
            .insert_event(NewEvent::new("Walk", "", utc(2024, 6, 1, 10, 0)))
            .await
            .unwrap();

        assert_eq!(id, "evt-42");
    }

    #[tokio::test]
    async fn test_insert_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "" })))
            .mount(&server)
            .await;

        let service = service_with(Arc::new(FakeIdentitySdk::new(server.uri())), Tz::UTC);
        let err = service
            .insert_event(NewEvent::new("Walk", "", utc(2024, 6, 1, 10, 0)))
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::Remote(RemoteCallError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/evt-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = service_with(Arc::new(FakeIdentitySdk::new(server.uri())), Tz::UTC);
        assert_eq!(service.delete_event("evt-1").await.unwrap(), DeleteOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let sdk = Arc::new(FakeIdentitySdk::new(server.uri()));
        let service = service_with(sdk.clone(), Tz::UTC);

        let err = service.delete_event("evt-1").await.unwrap_err();
        assert!(err.should_refresh_token());
        assert_eq!(service.auth().cached_token(), None);

        service.delete_event("evt-1").await.unwrap();
        assert_eq!(sdk.prompts(), vec![Prompt::Consent, Prompt::Consent]);
    }

    #[tokio::test]
    async fn test_init_failure_makes_no_rest_calls() {
        let server = MockServer::start().await;
        let sdk = Arc::new(FakeIdentitySdk::new(server.uri()).failing_at(FailAt::ClientInit));
        let service = service_with(sdk, Tz::UTC);

        let window = TimeWindow::new(utc(2024, 2, 4, 0, 0), utc(2024, 2, 11, 0, 0));
        let err = service.list_events(window).await.unwrap_err();

        assert!(matches!(err, CalendarError::Auth(AuthFlowError::Init(InitError::ClientInit(_)))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
