//! Scheduling moments and mirroring them to the calendar.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use kindred_calendar::{CalendarService, DeleteOutcome, NewEvent};
use kindred_core::{AppError, Moment, MomentDraft, MomentError, MomentStore, Notifier, RemoteCallError};

pub const SCHEDULED_MESSAGE: &str = "Moment added to your calendar";
pub const DELETED_MESSAGE: &str = "Moment deleted";

/// Moment operations that touch the calendar.
///
/// Sync and delete on the same moment run one at a time, so a delete issued
/// while an insert is in flight sees the new event id and removes it.
pub struct MomentService {
    store: Arc<MomentStore>,
    calendar: Arc<CalendarService>,
    notifier: Notifier,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    // Init failures are permanent; the user hears about them once
    init_reported: AtomicBool,
}

impl MomentService {
    pub fn new(store: Arc<MomentStore>, calendar: Arc<CalendarService>, notifier: Notifier) -> Self {
        Self {
            store,
            calendar,
            notifier,
            locks: Mutex::new(HashMap::new()),
            init_reported: AtomicBool::new(false),
        }
    }

    /// Record a moment locally. Nothing goes to the calendar yet.
    pub fn schedule(&self, draft: MomentDraft) -> Moment {
        let moment = self.store.add(draft);
        tracing::info!(id = %moment.id, title = %moment.title, "Moment scheduled");
        moment
    }

    /// Create the calendar event for a moment and remember its id.
    ///
    /// # Errors
    /// The moment stays unsynced and an error toast is shown if the insert
    /// fails.
    pub async fn sync(&self, id: Uuid) -> Result<Moment, AppError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let moment = self.store.get(id).ok_or(AppError::MomentNotFound(id))?;
        if moment.is_synced() {
            return Ok(moment);
        }

        let event = NewEvent::new(moment.title.clone(), moment.description.clone(), moment.date);
        let result = match self.calendar.insert_event(event).await {
            Ok(event_id) => match self.store.mark_synced(id, &event_id) {
                Ok(moment) => Ok(moment),
                Err(e) => {
                    self.discard_event(id, &event_id).await;
                    Err(moment_error(e))
                }
            },
            Err(e) => Err(AppError::from(e)),
        };

        match result {
            Ok(moment) => {
                self.notifier.success(SCHEDULED_MESSAGE);
                Ok(moment)
            }
            Err(e) => {
                tracing::error!(%id, "Failed to sync moment: {}", e);
                self.report(&e);
                Err(e)
            }
        }
    }

    /// `schedule` followed by `sync`. The moment is kept locally either way.
    ///
    /// # Errors
    /// See `sync`.
    pub async fn schedule_synced(&self, draft: MomentDraft) -> Result<Moment, AppError> {
        let moment = self.schedule(draft);
        self.sync(moment.id).await
    }

    /// Delete a moment, removing its calendar event first when it has one.
    ///
    /// # Errors
    /// If the remote delete fails the moment is kept and an error toast is
    /// shown.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let moment = self.store.get(id).ok_or(AppError::MomentNotFound(id))?;

        if let Some(event_id) = moment.calendar_event_id.as_deref().filter(|e| !e.is_empty()) {
            match self.calendar.delete_event(event_id).await {
                Ok(DeleteOutcome::Deleted) => {}
                Ok(DeleteOutcome::AlreadyGone) => {
                    tracing::info!(%id, event_id, "Calendar event was already gone");
                }
                Err(e) => {
                    let e = AppError::from(e);
                    tracing::error!(%id, "Failed to delete calendar event: {}", e);
                    self.report(&e);
                    return Err(e);
                }
            }
        }

        self.store.remove(id);
        self.locks.lock().remove(&id);
        self.notifier.success(DELETED_MESSAGE);
        Ok(())
    }

    pub fn list(&self) -> Vec<Moment> {
        self.store.list()
    }

    pub fn get(&self, id: Uuid) -> Option<Moment> {
        self.store.get(id)
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(id).or_default().clone()
    }

    /// Remove an event whose moment vanished before it could be linked.
    async fn discard_event(&self, id: Uuid, event_id: &str) {
        match self.calendar.delete_event(event_id).await {
            Ok(_) => tracing::warn!(%id, event_id, "Moment vanished during sync; calendar event removed"),
            Err(e) => tracing::error!(%id, event_id, "Failed to remove orphaned calendar event: {}", e),
        }
    }

    fn report(&self, err: &AppError) {
        if matches!(err, AppError::Init(_)) && self.init_reported.swap(true, Ordering::SeqCst) {
            tracing::debug!("Calendar unavailable, keeping moment local");
            return;
        }
        self.notifier.error(err.user_message());
    }
}

fn moment_error(err: MomentError) -> AppError {
    match err {
        MomentError::NotFound(id) => AppError::MomentNotFound(id),
        MomentError::EmptyEventId(_) => {
            AppError::RemoteCall(RemoteCallError::Malformed(err.to_string()))
        }
    }
}
