//! Google Calendar operations for Kindred.
//!
//! `CalendarClient` speaks the REST API with a caller-supplied token;
//! `CalendarService` adds authentication and normalization on top.

pub mod client;
pub mod error;
pub mod retry;
pub mod service;
pub mod types;

pub use client::CalendarClient;
pub use error::CalendarError;
pub use retry::RetryConfig;
pub use service::CalendarService;
pub use types::{CalendarEvent, DeleteOutcome, EventResource, NewEvent};
