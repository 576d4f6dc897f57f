//! Email-relay error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email relay is not configured: missing {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl EmailError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "Sharing is not set up. Check your email settings.",
            Self::NetworkError(_) => "Network error. Check your connection.",
        }
    }
}
