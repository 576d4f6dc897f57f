use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "KINDRED";

pub const DEFAULT_DISCOVERY_DOC: &str =
    "https://www.googleapis.com/discovery/v1/apis/calendar/v3/rest";
pub const DEFAULT_EMAIL_ENDPOINT: &str = "https://api.emailjs.com";
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Required settings that are absent or blank
    pub missing: Vec<String>,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty()
    }

    pub fn add_missing(&mut self, field: impl Into<String>) {
        self.missing.push(field.into());
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Collapse into the error `load_from` reports. Missing settings win.
    pub fn into_error(self) -> Option<ConfigError> {
        if !self.missing.is_empty() {
            Some(ConfigError::MissingSetting(self.missing.join(", ")))
        } else if !self.errors.is_empty() {
            Some(ConfigError::Invalid(self.error_summary()))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub agenda: AgendaConfig,
}

/// Google API credentials and the calendar to sync moments into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub client_id: String,

    /// Desktop OAuth clients are issued a secret; web clients are not.
    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub calendar_id: String,

    #[serde(default = "default_discovery_doc")]
    pub discovery_doc: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Loopback port the consent redirect lands on
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

fn default_discovery_doc() -> String {
    DEFAULT_DISCOVERY_DOC.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        CALENDAR_READONLY_SCOPE.to_string(),
        CALENDAR_EVENTS_SCOPE.to_string(),
    ]
}

fn default_redirect_port() -> u16 {
    8085
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            client_id: String::new(),
            client_secret: None,
            calendar_id: String::new(),
            discovery_doc: default_discovery_doc(),
            scopes: default_scopes(),
            redirect_port: default_redirect_port(),
        }
    }
}

impl GoogleConfig {
    /// Client secret with blank values treated as absent.
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Space-separated scope string as OAuth expects it.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// EmailJS relay settings for the weekly report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub service_id: String,

    #[serde(default)]
    pub template_id: String,

    #[serde(default)]
    pub public_key: String,

    /// Where weekly reports are delivered
    #[serde(default)]
    pub to_email: String,
}

fn default_email_endpoint() -> String {
    DEFAULT_EMAIL_ENDPOINT.to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: default_email_endpoint(),
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
            to_email: String::new(),
        }
    }
}

impl EmailConfig {
    /// Check if credentials are configured (not placeholders)
    pub fn is_configured(&self) -> bool {
        [
            &self.service_id,
            &self.template_id,
            &self.public_key,
            &self.to_email,
        ]
        .iter()
        .all(|v| !v.trim().is_empty() && !v.starts_with("YOUR_"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Subject line prefix; the send date is appended
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_subject_prefix() -> String {
    "Weekly NEEDS".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            subject_prefix: default_subject_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaConfig {
    /// Refresh interval in minutes (0 disables refresh)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,
}

fn default_refresh_minutes() -> u32 {
    5
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

impl Config {
    /// Load from the user config file and `KINDRED_*` environment variables.
    ///
    /// # Errors
    /// Fails if a source cannot be parsed or a required setting is missing.
    pub fn load() -> Result<(Self, ValidationResult), ConfigError> {
        let path = Self::config_path();
        Self::load_from(path.as_deref(), None)
    }

    /// Load from an explicit file path and, optionally, an explicit
    /// environment map instead of the process environment.
    ///
    /// # Errors
    /// Fails if a source cannot be parsed or validation finds errors.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<(Self, ValidationResult), ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let validation = config.validate();
        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }
        if let Some(err) = validation.clone().into_error() {
            return Err(err);
        }

        tracing::info!(
            api_key = %redact(&config.google.api_key),
            client_id = %redact(&config.google.client_id),
            calendar_id = %config.google.calendar_id,
            "Configuration loaded"
        );

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let required = [
            ("google.api_key", &self.google.api_key),
            ("google.client_id", &self.google.client_id),
            ("google.calendar_id", &self.google.calendar_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                result.add_missing(field);
            }
        }

        validate_url(&self.google.discovery_doc, "google.discovery_doc", &mut result);

        if self.google.scopes.is_empty() {
            result.add_error("google.scopes", "At least one OAuth scope is required");
        }

        if self.google.redirect_port == 0 {
            result.add_error("google.redirect_port", "Port cannot be 0");
        }

        if self.email.is_configured() {
            validate_url(&self.email.endpoint, "email.endpoint", &mut result);
        } else {
            result.add_warning(
                "email",
                "Email relay not configured - weekly reports will be unavailable",
            );
        }

        if self.agenda.refresh_minutes == 0 {
            result.add_warning("agenda.refresh_minutes", "Agenda refresh disabled (0 minutes)");
        }

        result
    }

    /// Path to the user config file, if a config directory exists
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kindred").join("config.toml"))
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => result.add_error(field_name, format!("Invalid URL: {}", e)),
    }
}

/// Keep the first 8 characters of a secret for log lines.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required_env() -> config::Map<String, String> {
        env(&[
            ("KINDRED_GOOGLE__API_KEY", "AIzaSyTestKey123456"),
            ("KINDRED_GOOGLE__CLIENT_ID", "1234.apps.googleusercontent.com"),
            ("KINDRED_GOOGLE__CALENDAR_ID", "primary"),
        ])
    }

    #[test]
    fn test_load_from_environment() {
        let (config, validation) = Config::load_from(None, Some(required_env())).unwrap();

        assert_eq!(config.google.api_key, "AIzaSyTestKey123456");
        assert_eq!(config.google.calendar_id, "primary");
        assert_eq!(config.google.discovery_doc, DEFAULT_DISCOVERY_DOC);
        assert_eq!(config.google.redirect_port, 8085);
        assert!(validation.is_valid());
    }

    #[test]
    fn test_missing_required_settings_fail_fast() {
        let err = Config::load_from(
            None,
            Some(env(&[("KINDRED_GOOGLE__API_KEY", "AIzaSyTestKey123456")])),
        )
        .unwrap_err();

        match err {
            ConfigError::MissingSetting(fields) => {
                assert!(fields.contains("google.client_id"));
                assert!(fields.contains("google.calendar_id"));
                assert!(!fields.contains("google.api_key"));
            }
            other => panic!("expected MissingSetting, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_setting_counts_as_missing() {
        let mut vars = required_env();
        vars.insert("KINDRED_GOOGLE__CLIENT_ID".to_string(), "   ".to_string());

        let err = Config::load_from(None, Some(vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(f) if f == "google.client_id"));
    }

    #[test]
    fn test_file_then_environment_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[google]
api_key = "from-file-key"
client_id = "file-client"
calendar_id = "family@group.calendar.google.com"
redirect_port = 9000

[report]
subject_prefix = "Our week"
"#
        )
        .unwrap();

        let vars = env(&[("KINDRED_GOOGLE__API_KEY", "from-env-key")]);
        let (config, _) = Config::load_from(Some(file.path()), Some(vars)).unwrap();

        assert_eq!(config.google.api_key, "from-env-key");
        assert_eq!(config.google.client_id, "file-client");
        assert_eq!(config.google.redirect_port, 9000);
        assert_eq!(config.report.subject_prefix, "Our week");
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("kindred-does-not-exist.toml");
        assert!(Config::load_from(Some(&path), Some(required_env())).is_ok());
    }

    #[test]
    fn test_invalid_discovery_url() {
        let mut vars = required_env();
        vars.insert(
            "KINDRED_GOOGLE__DISCOVERY_DOC".to_string(),
            "ftp://example.com/doc".to_string(),
        );

        let err = Config::load_from(None, Some(vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("http or https")));
    }

    #[test]
    fn test_email_not_configured_is_warning() {
        let (_, validation) = Config::load_from(None, Some(required_env())).unwrap();
        assert!(validation.is_valid());
        assert!(validation.warnings.iter().any(|w| w.field == "email"));
    }

    #[test]
    fn test_blank_client_secret_is_absent() {
        let mut config = Config::default();
        config.google.client_secret = Some("  ".to_string());
        assert_eq!(config.google.client_secret(), None);

        config.google.client_secret = Some("shh".to_string());
        assert_eq!(config.google.client_secret(), Some("shh"));
    }

    #[test]
    fn test_redact_keeps_prefix_only() {
        assert_eq!(redact("AIzaSyTestKey123456"), "AIzaSyTe...");
        assert_eq!(redact("abc"), "abc...");
    }
}
