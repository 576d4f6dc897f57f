//! Calendar-specific error types.

use thiserror::Error;

use kindred_auth::AuthFlowError;
use kindred_core::{AppError, RemoteCallError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// No token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthFlowError),

    /// The REST call itself failed
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
}

impl CalendarError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.user_message(),
            Self::Remote(e) => e.user_message(),
        }
    }

    /// Whether the cached token should be dropped.
    pub fn should_refresh_token(&self) -> bool {
        matches!(self, Self::Remote(RemoteCallError::TokenExpired))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteCallError::RateLimited(_) | RemoteCallError::Network(_))
        )
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::Auth(e) => e.into(),
            CalendarError::Remote(e) => AppError::RemoteCall(e),
        }
    }
}

/// `reqwest` failures all surface as network errors.
pub(crate) fn network_error(err: reqwest::Error) -> RemoteCallError {
    RemoteCallError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::{AuthError, InitError};

    #[test]
    fn test_should_refresh_token() {
        assert!(CalendarError::Remote(RemoteCallError::TokenExpired).should_refresh_token());
        assert!(!CalendarError::Remote(RemoteCallError::Conflict).should_refresh_token());
        assert!(!CalendarError::Auth(AuthError::CallbackDropped.into()).should_refresh_token());
    }

    #[test]
    fn test_is_retryable() {
        assert!(CalendarError::Remote(RemoteCallError::RateLimited(10)).is_retryable());
        assert!(CalendarError::Remote(RemoteCallError::Network("reset".into())).is_retryable());
        assert!(!CalendarError::Remote(RemoteCallError::NotFound("x".into())).is_retryable());
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = CalendarError::Auth(InitError::Timeout(5000).into()).into();
        assert!(matches!(app, AppError::Init(InitError::Timeout(5000))));

        let app: AppError = CalendarError::Remote(RemoteCallError::Conflict).into();
        assert!(matches!(app, AppError::RemoteCall(RemoteCallError::Conflict)));
    }
}
