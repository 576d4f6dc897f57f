use thiserror::Error;

use kindred_core::{AppError, AuthError, InitError};

/// Everything that can stop `CalendarAuthClient` from producing a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFlowError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AuthFlowError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Init(e) => e.user_message(),
            Self::Auth(e) => e.user_message(),
        }
    }
}

impl From<AuthFlowError> for AppError {
    fn from(err: AuthFlowError) -> Self {
        match err {
            AuthFlowError::Init(e) => AppError::Init(e),
            AuthFlowError::Auth(e) => AppError::Auth(e),
        }
    }
}
