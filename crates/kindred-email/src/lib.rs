//! Weekly report delivery for Kindred.
//!
//! Reports go out through an email-relay HTTP API rather than SMTP.

pub mod error;
pub mod relay;
pub mod report;

pub use error::EmailError;
pub use relay::{Email, EmailJsRelay, EmailRelay};
pub use report::{RejectReason, SubmitOutcome, WeeklyReport, WeeklyUpdateForm};
