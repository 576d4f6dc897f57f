//! The weekly wellbeing report and the form that sends it.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use kindred_core::{Notifier, ReportConfig};

use crate::relay::{Email, EmailRelay};

pub const SHARED_MESSAGE: &str = "Weekly update shared successfully!";
pub const REFUSED_MESSAGE: &str = "Failed to share. Please try again.";
pub const FAILED_MESSAGE: &str = "Something went wrong. Please try again.";

/// Formats the weekly email.
#[derive(Debug, Clone)]
pub struct WeeklyReport {
    subject_prefix: String,
}

impl WeeklyReport {
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        Self {
            subject_prefix: subject_prefix.into(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.subject_prefix.clone())
    }

    /// Subject and body, with dates rendered in `tz`.
    pub fn compose(&self, issues: &str, wellbeing: &str, sent_at: DateTime<Utc>, tz: &Tz) -> Email {
        let local = sent_at.with_timezone(tz);
        Email {
            subject: format!("{} - {}", self.subject_prefix, local.format("%d/%m/%Y")),
            body: format!(
                "Weekly Challenges:\n\n{}\n\nCurrent Wellbeing:\n\n{}\n\nSent on: {}",
                issues,
                wellbeing,
                local.format("%d/%m/%Y %H:%M"),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A field is blank
    Incomplete,
    /// A previous submit hasn't finished
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    Refused,
    Failed,
    /// The relay was never called
    Rejected(RejectReason),
}

#[derive(Debug, Default, Clone)]
struct Fields {
    weekly_issues: String,
    wellbeing: String,
}

/// Two free-text fields and a send button.
///
/// Fields survive a failed send so the user can retry; a successful send
/// clears them.
pub struct WeeklyUpdateForm {
    report: WeeklyReport,
    tz: Tz,
    fields: Mutex<Fields>,
    submitting: AtomicBool,
}

impl WeeklyUpdateForm {
    pub fn new(report: WeeklyReport, tz: Tz) -> Self {
        Self {
            report,
            tz,
            fields: Mutex::new(Fields::default()),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn set_weekly_issues(&self, text: impl Into<String>) {
        self.fields.lock().weekly_issues = text.into();
    }

    pub fn set_wellbeing(&self, text: impl Into<String>) {
        self.fields.lock().wellbeing = text.into();
    }

    pub fn weekly_issues(&self) -> String {
        self.fields.lock().weekly_issues.clone()
    }

    pub fn wellbeing(&self) -> String {
        self.fields.lock().wellbeing.clone()
    }

    pub fn can_submit(&self) -> bool {
        let fields = self.fields.lock();
        !fields.weekly_issues.trim().is_empty() && !fields.wellbeing.trim().is_empty()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    /// Send the report and toast the result.
    pub async fn submit(
        &self,
        relay: &dyn EmailRelay,
        notifier: &Notifier,
        now: DateTime<Utc>,
    ) -> SubmitOutcome {
        if !self.can_submit() {
            return SubmitOutcome::Rejected(RejectReason::Incomplete);
        }
        if self.submitting.swap(true, Ordering::SeqCst) {
            tracing::debug!("Weekly update already being sent");
            return SubmitOutcome::Rejected(RejectReason::InFlight);
        }
        let _guard = SubmittingGuard(&self.submitting);

        let fields = self.fields.lock().clone();
        let email = self
            .report
            .compose(&fields.weekly_issues, &fields.wellbeing, now, &self.tz);

        match relay.send_email(&email).await {
            Ok(true) => {
                *self.fields.lock() = Fields::default();
                notifier.success(SHARED_MESSAGE);
                SubmitOutcome::Sent
            }
            Ok(false) => {
                notifier.error(REFUSED_MESSAGE);
                SubmitOutcome::Refused
            }
            Err(e) => {
                tracing::error!("Failed to send weekly update: {}", e);
                notifier.error(FAILED_MESSAGE);
                SubmitOutcome::Failed
            }
        }
    }
}

/// Clears the in-flight flag even if the submit future is dropped.
struct SubmittingGuard<'a>(&'a AtomicBool);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
