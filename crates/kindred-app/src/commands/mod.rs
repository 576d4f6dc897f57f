pub mod config;
pub mod report;
pub mod schedule;
pub mod week;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use kindred_app::App;
use kindred_core::{Config, Toast, ToastKind};

/// Load config and wire the app, failing early on bad settings.
pub fn load_app() -> Result<(App, mpsc::UnboundedReceiver<Toast>)> {
    let (config, _) = Config::load().context("Failed to load configuration")?;
    App::new(config).context("Failed to start Kindred")
}

/// Print whatever toasts were raised while the command ran.
pub fn flush_toasts(toasts: &mut mpsc::UnboundedReceiver<Toast>) {
    while let Ok(toast) = toasts.try_recv() {
        match toast.kind {
            ToastKind::Success => eprintln!("✓ {}", toast.message),
            ToastKind::Error => eprintln!("✗ {}", toast.message),
        }
    }
}
