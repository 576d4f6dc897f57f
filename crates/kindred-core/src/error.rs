//! Centralized error types for Kindred.
//!
//! Each kind maps to one way the app can go wrong:
//! - `ConfigError`: required settings are missing, fatal at startup
//! - `InitError`: the provider SDKs could not be loaded or initialized
//! - `AuthError`: consent was denied or the token request failed
//! - `RemoteCallError`: the calendar API rejected a call or answered garbage
//!
//! Use `user_message()` for anything shown in a notification.

use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Calendar request failed: {0}")]
    RemoteCall(#[from] RemoteCallError),

    #[error("Moment not found: {0}")]
    MomentNotFound(uuid::Uuid),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for a toast.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Init(e) => e.user_message(),
            AppError::Auth(e) => e.user_message(),
            AppError::RemoteCall(e) => e.user_message(),
            AppError::MomentNotFound(_) => "That moment no longer exists.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Whether the user can reasonably retry the action that failed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Config(_) | AppError::Init(_) => false,
            AppError::Auth(_) | AppError::RemoteCall(_) => true,
            AppError::MomentNotFound(_) | AppError::Other(_) => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Provider SDK load/initialization failures.
///
/// Cloned out of the memoized init result, so every payload is owned text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("API client failed to load: {0}")]
    ApiClientLoad(String),

    #[error("Identity service failed to load: {0}")]
    IdentityServiceLoad(String),

    #[error("API client initialization failed: {0}")]
    ClientInit(String),

    #[error("Token client initialization failed: {0}")]
    TokenClientInit(String),

    #[error("Provider SDK load timed out after {0} ms")]
    Timeout(u64),
}

impl InitError {
    pub fn user_message(&self) -> &'static str {
        match self {
            InitError::Timeout(_) => {
                "Google Calendar took too long to load. Calendar features are disabled."
            }
            _ => "Google Calendar could not be initialized. Calendar features are disabled.",
        }
    }
}

/// Token acquisition failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token request rejected: {error}")]
    TokenRejected {
        error: String,
        description: Option<String>,
    },

    #[error("Token request could not be dispatched: {0}")]
    RequestFailed(String),

    #[error("Token callback was dropped before it fired")]
    CallbackDropped,

    #[error("Token request timed out after {0} seconds")]
    Timeout(u64),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::TokenRejected { error, .. } if error == "access_denied" => {
                "Calendar access was not granted. Try again to allow it."
            }
            AuthError::TokenRejected { .. } => "Sign-in failed. Please try again.",
            AuthError::RequestFailed(_) => "Could not start sign-in. Please try again.",
            AuthError::CallbackDropped => "Sign-in was interrupted. Please try again.",
            AuthError::Timeout(_) => "Sign-in took too long. Please try again.",
        }
    }

    /// True when the provider said the user declined consent.
    pub fn is_consent_denied(&self) -> bool {
        matches!(self, AuthError::TokenRejected { error, .. } if error == "access_denied")
    }
}

/// Failures of list/insert/delete against the calendar REST API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteCallError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: event was modified")]
    Conflict,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl RemoteCallError {
    pub fn user_message(&self) -> &'static str {
        match self {
            RemoteCallError::TokenExpired => "Your session has expired. Please try again.",
            RemoteCallError::Forbidden(_) => "Calendar access was refused.",
            RemoteCallError::NotFound(_) => "The calendar event could not be found.",
            RemoteCallError::Conflict => "The event was modified elsewhere. Please refresh.",
            RemoteCallError::RateLimited(_) => "Too many requests. Please wait a moment.",
            RemoteCallError::Status { status, .. } if *status >= 500 => {
                "Google Calendar is having issues. Please try again later."
            }
            RemoteCallError::Status { .. } => "The calendar request failed. Please try again.",
            RemoteCallError::Malformed(_) => "Received an unexpected response. Please try again.",
            RemoteCallError::Network(_) => "Network error. Check your connection.",
        }
    }
}
