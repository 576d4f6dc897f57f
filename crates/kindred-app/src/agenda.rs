//! This week's calendar, fetched on demand or refreshed in the background.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kindred_auth::AuthFlowError;
use kindred_calendar::{CalendarError, CalendarEvent, CalendarService};
use kindred_core::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgendaUpdate {
    Events {
        window: TimeWindow,
        events: Vec<CalendarEvent>,
    },
    Failed(CalendarError),
}

#[derive(Clone)]
pub struct Agenda {
    calendar: Arc<CalendarService>,
}

impl Agenda {
    pub fn new(calendar: Arc<CalendarService>) -> Self {
        Self { calendar }
    }

    /// The local Sunday-to-Sunday week containing `now`.
    pub fn week_of(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::week_containing(now, &self.calendar.timezone())
    }

    /// # Errors
    /// Whatever listing the calendar failed with.
    pub async fn this_week(&self, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.calendar.list_events(self.week_of(now)).await
    }

    /// Refresh every `interval` until `cancel` fires or the receiver is
    /// dropped. The first refresh happens immediately.
    ///
    /// An initialization failure is published once and ends the loop, since
    /// the calendar stays unavailable for this session.
    pub fn spawn_refresh(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, mpsc::Receiver<AgendaUpdate>) {
        let (tx, rx) = mpsc::channel(8);
        let agenda = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Agenda refresh cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let now = Utc::now();
                let window = agenda.week_of(now);
                let (update, fatal) = match agenda.calendar.list_events(window).await {
                    Ok(events) => (AgendaUpdate::Events { window, events }, false),
                    Err(e) => {
                        if e.is_retryable() {
                            tracing::info!("Agenda refresh hit a transient error, retrying next tick: {}", e);
                        } else {
                            tracing::warn!("Agenda refresh failed: {}", e);
                        }
                        let fatal = matches!(e, CalendarError::Auth(AuthFlowError::Init(_)));
                        (AgendaUpdate::Failed(e), fatal)
                    }
                };

                if tx.send(update).await.is_err() {
                    tracing::debug!("Agenda receiver dropped, stopping refresh");
                    break;
                }
                if fatal {
                    tracing::info!("Calendar unavailable, stopping agenda refresh");
                    break;
                }
            }
        });

        (handle, rx)
    }
}
