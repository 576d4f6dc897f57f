//! Scheduled moments and their in-memory store.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A user-scheduled wellbeing activity, optionally mirrored to the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    /// Set once the remote event has been created
    pub calendar_event_id: Option<String>,
}

impl Moment {
    /// Only true when the remote insert confirmed an event id.
    pub fn is_synced(&self) -> bool {
        self.calendar_event_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// What the schedule form hands us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentDraft {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
}

impl MomentDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            date,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MomentError {
    #[error("Moment not found: {0}")]
    NotFound(Uuid),

    #[error("Refusing to mark moment {0} synced without an event id")]
    EmptyEventId(Uuid),
}

/// Thread-safe store for moments of the current session.
#[derive(Debug, Default)]
pub struct MomentStore {
    moments: RwLock<Vec<Moment>>,
}

impl MomentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a moment from a draft. New moments are never synced.
    pub fn add(&self, draft: MomentDraft) -> Moment {
        let moment = Moment {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            date: draft.date,
            calendar_event_id: None,
        };
        self.moments.write().push(moment.clone());
        tracing::debug!(moment_id = %moment.id, "Moment added");
        moment
    }

    pub fn get(&self, id: Uuid) -> Option<Moment> {
        self.moments.read().iter().find(|m| m.id == id).cloned()
    }

    /// All moments ordered by date.
    pub fn list(&self) -> Vec<Moment> {
        let mut moments = self.moments.read().clone();
        moments.sort_by_key(|m| m.date);
        moments
    }

    /// Moments at or after `now`, ordered by date.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<Moment> {
        self.list().into_iter().filter(|m| m.date >= now).collect()
    }

    /// Record the event id the calendar assigned to a moment.
    ///
    /// # Errors
    /// Rejects unknown moments and empty ids.
    pub fn mark_synced(&self, id: Uuid, event_id: &str) -> Result<Moment, MomentError> {
        if event_id.trim().is_empty() {
            return Err(MomentError::EmptyEventId(id));
        }

        let mut moments = self.moments.write();
        let moment = moments
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(MomentError::NotFound(id))?;
        moment.calendar_event_id = Some(event_id.to_string());
        Ok(moment.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<Moment> {
        let mut moments = self.moments.write();
        let index = moments.iter().position(|m| m.id == id)?;
        Some(moments.remove(index))
    }

    pub fn len(&self) -> usize {
        self.moments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.read().is_empty()
    }
}
