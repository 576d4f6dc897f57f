#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use chrono_tz::Tz;

use kindred_app::App;
use kindred_auth::fake::FakeIdentitySdk;
use kindred_core::{Config, EmailConfig, GoogleConfig, Toast};
use tokio::sync::mpsc;

pub fn config() -> Config {
    Config {
        google: GoogleConfig {
            api_key: "AIzaSyTestKey123456".into(),
            client_id: "1234.apps.googleusercontent.com".into(),
            calendar_id: "primary".into(),
            ..GoogleConfig::default()
        },
        ..Config::default()
    }
}

pub fn config_with_email(endpoint: &str) -> Config {
    Config {
        email: EmailConfig {
            endpoint: endpoint.to_string(),
            service_id: "service_abc".into(),
            template_id: "template_xyz".into(),
            public_key: "pk_123".into(),
            to_email: "partner@example.com".into(),
        },
        ..config()
    }
}

pub fn app_with(config: Config, sdk: Arc<FakeIdentitySdk>) -> (App, mpsc::UnboundedReceiver<Toast>) {
    App::with_sdk(config, sdk, reqwest::Client::new(), Tz::UTC).unwrap()
}

pub fn drain(toasts: &mut mpsc::UnboundedReceiver<Toast>) -> Vec<Toast> {
    let mut out = Vec::new();
    while let Ok(toast) = toasts.try_recv() {
        out.push(toast);
    }
    out
}
