use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;

use kindred_auth::{AuthSettings, AuthState, CalendarAuthClient, GoogleEndpoints, GoogleIdentitySdk, IdentitySdk};
use kindred_calendar::CalendarService;
use kindred_core::{local_timezone, AppError, Config, MomentStore, Notifier, Toast};
use kindred_email::{EmailJsRelay, EmailRelay, SubmitOutcome, WeeklyReport, WeeklyUpdateForm};

use crate::agenda::Agenda;
use crate::moments::MomentService;

/// Everything a front-end needs, wired from one `Config`.
///
/// Construction does no network I/O; the calendar initializes on first use.
pub struct App {
    config: Config,
    tz: Tz,
    notifier: Notifier,
    auth: Arc<CalendarAuthClient>,
    calendar: Arc<CalendarService>,
    moments: MomentService,
    agenda: Agenda,
    /// The reason is shown when a report can't be sent
    relay: Result<Arc<dyn EmailRelay>, &'static str>,
    weekly_form: WeeklyUpdateForm,
}

impl App {
    /// Wire the app against Google.
    ///
    /// # Errors
    /// `AppError::Config` when the config fails validation.
    pub fn new(config: Config) -> Result<(Self, mpsc::UnboundedReceiver<Toast>), AppError> {
        let http = reqwest::Client::new();
        let sdk = Arc::new(GoogleIdentitySdk::new(http.clone(), GoogleEndpoints::default()));
        Self::with_sdk(config, sdk, http, local_timezone())
    }

    /// Wire the app against any identity SDK and timezone.
    ///
    /// # Errors
    /// `AppError::Config` when the config fails validation.
    pub fn with_sdk(
        config: Config,
        sdk: Arc<dyn IdentitySdk>,
        http: reqwest::Client,
        tz: Tz,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Toast>), AppError> {
        if let Some(err) = config.validate().into_error() {
            return Err(err.into());
        }

        let (notifier, toasts) = Notifier::channel();

        let auth = Arc::new(CalendarAuthClient::new(sdk, AuthSettings::from_config(&config.google)));
        let calendar = Arc::new(CalendarService::new(
            auth.clone(),
            http.clone(),
            config.google.calendar_id.clone(),
            tz,
        ));

        let moments = MomentService::new(Arc::new(MomentStore::new()), calendar.clone(), notifier.clone());
        let agenda = Agenda::new(calendar.clone());

        let relay: Result<Arc<dyn EmailRelay>, &'static str> =
            match EmailJsRelay::from_config(http, &config.email) {
                Ok(relay) => Ok(Arc::new(relay)),
                Err(e) => {
                    tracing::warn!("Weekly reports disabled: {}", e);
                    Err(e.user_message())
                }
            };
        let weekly_form = WeeklyUpdateForm::new(WeeklyReport::from_config(&config.report), tz);

        tracing::info!(timezone = %tz.name(), calendar_id = %config.google.calendar_id, "Kindred wired");

        Ok((
            Self {
                config,
                tz,
                notifier,
                auth,
                calendar,
                moments,
                agenda,
                relay,
                weekly_form,
            },
            toasts,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn auth(&self) -> &Arc<CalendarAuthClient> {
        &self.auth
    }

    pub fn calendar(&self) -> &Arc<CalendarService> {
        &self.calendar
    }

    pub fn moments(&self) -> &MomentService {
        &self.moments
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn weekly_form(&self) -> &WeeklyUpdateForm {
        &self.weekly_form
    }

    /// False once initialization has failed; it stays false for this `App`.
    pub fn calendar_enabled(&self) -> bool {
        self.auth.state() != AuthState::Failed
    }

    pub fn reports_enabled(&self) -> bool {
        self.relay.is_ok()
    }

    /// Configured agenda refresh period, or `None` when disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.config.agenda.refresh_minutes {
            0 => None,
            m => Some(Duration::from_secs(u64::from(m) * 60)),
        }
    }

    /// Send the weekly form's contents.
    ///
    /// Without a configured relay this toasts an error and reports `Failed`.
    pub async fn submit_weekly_update(&self, now: DateTime<Utc>) -> SubmitOutcome {
        match &self.relay {
            Ok(relay) => self.weekly_form.submit(relay.as_ref(), &self.notifier, now).await,
            Err(reason) => {
                self.notifier.error(*reason);
                SubmitOutcome::Failed
            }
        }
    }
}
