//! Shared foundations for Kindred: configuration, the error taxonomy,
//! the moment model and a few time helpers.

pub mod config;
pub mod error;
pub mod moment;
pub mod notify;
pub mod time;

pub use config::{
    AgendaConfig, Config, ConfigValidationError, EmailConfig, GoogleConfig, ReportConfig,
    ValidationResult,
};
pub use error::{AppError, AuthError, ConfigError, InitError, RemoteCallError};
pub use moment::{Moment, MomentDraft, MomentError, MomentStore};
pub use notify::{Notifier, Toast, ToastKind};
pub use time::{local_timezone, TimeWindow};

use anyhow::Result;

/// Initialize tracing for the process.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Kindred core initialized");
    Ok(())
}
