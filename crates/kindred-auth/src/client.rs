//! Load/init sequencing and token acquisition for Google Calendar.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::instrument;

use kindred_core::config::redact;
use kindred_core::{AuthError, GoogleConfig, InitError};

use crate::error::AuthFlowError;
use crate::sdk::{
    ApiClientConfig, ApiClientInfo, IdentitySdk, Prompt, TokenCallback, TokenClientConfig,
    TokenResponse,
};

/// Matches the provider loader's own timeout.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(5000);
/// Consent needs a human, so token requests get far longer.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(300);

/// Inputs to the init sequence.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub api_key: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub discovery_doc: String,
    pub scope: String,
    pub redirect_port: u16,
    pub load_timeout: Duration,
    pub token_timeout: Duration,
}

impl AuthSettings {
    pub fn from_config(google: &GoogleConfig) -> Self {
        Self {
            api_key: google.api_key.clone(),
            client_id: google.client_id.clone(),
            client_secret: google.client_secret().map(str::to_string),
            discovery_doc: google.discovery_doc.clone(),
            scope: google.scope(),
            redirect_port: google.redirect_port,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Initializing,
    Ready,
    AcquiringToken,
    /// Terminal for this instance
    Failed,
}

#[derive(Debug, Default, Clone)]
struct AuthSession {
    access_token: Option<String>,
}

/// Produces bearer tokens for calendar REST calls.
///
/// Construct one per app and share it behind an `Arc`. The first
/// auth-dependent call initializes it; concurrent callers wait on that same
/// initialization. A failed initialization is remembered and reported to
/// every later caller.
pub struct CalendarAuthClient {
    sdk: Arc<dyn IdentitySdk>,
    settings: AuthSettings,
    init: OnceCell<Result<ApiClientInfo, InitError>>,
    state: Mutex<AuthState>,
    session: RwLock<AuthSession>,
    // Held across the whole request/callback round trip
    token_gate: tokio::sync::Mutex<()>,
}

impl CalendarAuthClient {
    pub fn new(sdk: Arc<dyn IdentitySdk>, settings: AuthSettings) -> Self {
        Self {
            sdk,
            settings,
            init: OnceCell::new(),
            state: Mutex::new(AuthState::Uninitialized),
            session: RwLock::new(AuthSession::default()),
            token_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock()
    }

    /// REST root resolved during init, once init has succeeded.
    pub fn api_base_url(&self) -> Option<String> {
        match self.init.get() {
            Some(Ok(info)) => Some(info.base_url.clone()),
            _ => None,
        }
    }

    pub fn cached_token(&self) -> Option<String> {
        self.session.read().access_token.clone()
    }

    /// Forget the cached token; the next request asks for consent again.
    pub fn invalidate_token(&self) {
        if self.session.write().access_token.take().is_some() {
            tracing::debug!("Cached access token invalidated");
        }
    }

    pub fn sign_out(&self) {
        self.invalidate_token();
        tracing::info!("Signed out of Google Calendar");
    }

    /// Initialize on first use and return what init learned.
    ///
    /// # Errors
    /// Returns the (memoized) `InitError` if the SDKs failed to load or init.
    pub async fn ensure_ready(&self) -> Result<ApiClientInfo, InitError> {
        self.init.get_or_init(|| self.initialize()).await.clone()
    }

    /// Get a bearer token, asking for consent when none is cached and
    /// renewing silently otherwise.
    ///
    /// # Errors
    /// `Init` if the client can't initialize, `Auth` if the token request
    /// was rejected, dropped or timed out.
    pub async fn access_token(&self) -> Result<String, AuthFlowError> {
        self.ensure_ready().await?;

        let _gate = self.token_gate.lock().await;
        let prompt = if self.session.read().access_token.is_some() {
            Prompt::Silent
        } else {
            Prompt::Consent
        };

        let result = {
            let _acquiring = AcquiringGuard::enter(self);
            self.request_token(prompt).await
        };

        match result {
            Ok(token) => {
                self.session.write().access_token = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                if matches!(err, AuthError::TokenRejected { .. }) {
                    self.session.write().access_token = None;
                }
                Err(err.into())
            }
        }
    }

    #[instrument(skip(self), level = "info")]
    async fn initialize(&self) -> Result<ApiClientInfo, InitError> {
        self.set_state(AuthState::Initializing);
        tracing::info!(
            api_key = %redact(&self.settings.api_key),
            client_id = %redact(&self.settings.client_id),
            "Initializing Google Calendar"
        );

        let result = self.run_init().await;
        match &result {
            Ok(info) => {
                self.set_state(AuthState::Ready);
                tracing::info!(base_url = %info.base_url, "Google Calendar initialized");
            }
            Err(e) => {
                self.set_state(AuthState::Failed);
                tracing::error!("Google Calendar initialization failed: {}", e);
            }
        }
        result
    }

    async fn run_init(&self) -> Result<ApiClientInfo, InitError> {
        let loads = async {
            tokio::try_join!(self.sdk.load_api_client(), self.sdk.load_identity_service())
        };
        tokio::time::timeout(self.settings.load_timeout, loads)
            .await
            .map_err(|_| InitError::Timeout(self.settings.load_timeout.as_millis() as u64))??;

        let info = self
            .sdk
            .init_client(&ApiClientConfig {
                api_key: self.settings.api_key.clone(),
                discovery_doc: self.settings.discovery_doc.clone(),
            })
            .await?;

        self.sdk
            .init_token_client(&TokenClientConfig {
                client_id: self.settings.client_id.clone(),
                client_secret: self.settings.client_secret.clone(),
                scope: self.settings.scope.clone(),
                redirect_port: self.settings.redirect_port,
            })
            .await?;

        Ok(info)
    }

    async fn request_token(&self, prompt: Prompt) -> Result<String, AuthError> {
        // The callback travels with the request, so it is bound before dispatch.
        let (callback, rx) = TokenCallback::channel();
        tracing::debug!(prompt = prompt.as_str(), "Requesting access token");
        self.sdk.request_access_token(prompt, callback)?;

        let response = match tokio::time::timeout(self.settings.token_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(AuthError::CallbackDropped),
            Err(_) => return Err(AuthError::Timeout(self.settings.token_timeout.as_secs())),
        };

        match response {
            TokenResponse::Granted { access_token, .. } => Ok(access_token),
            TokenResponse::Error { error, description } => {
                tracing::warn!(%error, ?description, "Token request rejected");
                Err(AuthError::TokenRejected { error, description })
            }
        }
    }

    fn set_state(&self, next: AuthState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "Auth state change");
            *state = next;
        }
    }
}

/// Holds the client in `AcquiringToken` until dropped, even if the
/// `access_token` future is abandoned mid-request.
struct AcquiringGuard<'a>(&'a CalendarAuthClient);

impl<'a> AcquiringGuard<'a> {
    fn enter(client: &'a CalendarAuthClient) -> Self {
        client.set_state(AuthState::AcquiringToken);
        Self(client)
    }
}

impl Drop for AcquiringGuard<'_> {
    fn drop(&mut self) {
        self.0.set_state(AuthState::Ready);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::fake::{FailAt, FakeIdentitySdk};

    fn settings() -> AuthSettings {
        AuthSettings {
            api_key: "AIzaSyTestKey".into(),
            client_id: "client.apps.googleusercontent.com".into(),
            client_secret: None,
            discovery_doc: "https://example.test/discovery".into(),
            scope: "https://www.googleapis.com/auth/calendar.events".into(),
            redirect_port: 8085,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    fn client_with(sdk: Arc<FakeIdentitySdk>) -> CalendarAuthClient {
        CalendarAuthClient::new(sdk, settings())
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test"));
        let client = client_with(sdk.clone());
        assert_eq!(client.state(), AuthState::Uninitialized);
        assert_eq!(client.api_base_url(), None);

        let info = client.ensure_ready().await.unwrap();

        assert_eq!(info.base_url, "http://calendar.test");
        assert_eq!(client.state(), AuthState::Ready);
        assert_eq!(client.api_base_url().as_deref(), Some("http://calendar.test"));

        let client_config = sdk.last_client_config().unwrap();
        assert_eq!(client_config.api_key, "AIzaSyTestKey");
        assert_eq!(client_config.discovery_doc, "https://example.test/discovery");
        let token_config = sdk.last_token_config().unwrap();
        assert_eq!(token_config.client_id, "client.apps.googleusercontent.com");
        assert_eq!(token_config.scope, "https://www.googleapis.com/auth/calendar.events");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_initialization() {
        let sdk = Arc::new(
            FakeIdentitySdk::new("http://calendar.test").with_load_delay(Duration::from_millis(50)),
        );
        let client = Arc::new(client_with(sdk.clone()));

        let a = tokio::spawn({
            let client = client.clone();
            async move { client.access_token().await }
        });
        let b = tokio::spawn({
            let client = client.clone();
            async move { client.access_token().await }
        });

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());

        let counts = sdk.call_counts();
        assert_eq!(counts.load_api_client, 1);
        assert_eq!(counts.load_identity_service, 1);
        assert_eq!(counts.init_client, 1);
        assert_eq!(counts.init_token_client, 1);
    }

    #[tokio::test]
    async fn test_first_request_uses_consent_then_silent() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test"));
        let client = client_with(sdk.clone());

        let first = client.access_token().await.unwrap();
        let second = client.access_token().await.unwrap();

        assert_eq!(first, "fake-token-1");
        assert_eq!(second, "fake-token-2");
        assert_eq!(sdk.prompts(), vec![Prompt::Consent, Prompt::Silent]);
        assert_eq!(client.cached_token().as_deref(), Some("fake-token-2"));
    }

    #[tokio::test]
    async fn test_error_response_rejects_and_clears_token() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test"));
        let client = client_with(sdk.clone());

        client.access_token().await.unwrap();
        sdk.push_response(TokenResponse::error(
            "interaction_required",
            Some("session expired".into()),
        ));

        let err = client.access_token().await.unwrap_err();
        assert_eq!(
            err,
            AuthFlowError::Auth(AuthError::TokenRejected {
                error: "interaction_required".into(),
                description: Some("session expired".into()),
            })
        );
        assert_eq!(client.state(), AuthState::Ready);
        assert_eq!(client.cached_token(), None);

        // Without a token the next attempt asks for consent again
        client.access_token().await.unwrap();
        assert_eq!(
            sdk.prompts(),
            vec![Prompt::Consent, Prompt::Silent, Prompt::Consent]
        );
    }

    #[tokio::test]
    async fn test_consent_denied() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test"));
        sdk.push_response(TokenResponse::error("access_denied", None));
        let client = client_with(sdk);

        let err = client.access_token().await.unwrap_err();
        match err {
            AuthFlowError::Auth(e) => assert!(e.is_consent_denied()),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_init_failure_is_terminal() {
        let sdk = Arc::new(
            FakeIdentitySdk::new("http://calendar.test").failing_at(FailAt::IdentityServiceLoad),
        );
        let client = client_with(sdk.clone());

        let first = client.access_token().await.unwrap_err();
        let second = client.access_token().await.unwrap_err();

        assert!(matches!(first, AuthFlowError::Init(InitError::IdentityServiceLoad(_))));
        assert_eq!(first, second);
        assert_eq!(client.state(), AuthState::Failed);
        assert_eq!(sdk.call_counts().load_identity_service, 1);
        assert_eq!(sdk.call_counts().init_client, 0);
        assert!(sdk.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_client_init_failure_skips_token_client() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test").failing_at(FailAt::ClientInit));
        let client = client_with(sdk.clone());

        let err = client.ensure_ready().await.unwrap_err();
        assert!(matches!(err, InitError::ClientInit(_)));
        assert_eq!(sdk.call_counts().init_token_client, 0);
        assert_eq!(client.api_base_url(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout() {
        let sdk = Arc::new(
            FakeIdentitySdk::new("http://calendar.test").with_load_delay(Duration::from_secs(10)),
        );
        let client = client_with(sdk);

        let err = client.ensure_ready().await.unwrap_err();
        assert_eq!(err, InitError::Timeout(5000));
        assert_eq!(client.state(), AuthState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_requests_are_serialized() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test").holding_requests());
        let client = Arc::new(client_with(sdk.clone()));

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.access_token().await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.access_token().await }
        });

        // Let both tasks reach the gate
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sdk.pending_requests(), 1);
        assert_eq!(client.state(), AuthState::AcquiringToken);

        assert!(sdk.release(TokenResponse::granted("token-a")));
        assert_eq!(first.await.unwrap().unwrap(), "token-a");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sdk.pending_requests(), 1);
        assert!(sdk.release(TokenResponse::granted("token-b")));
        assert_eq!(second.await.unwrap().unwrap(), "token-b");

        // The second request saw the first token cached
        assert_eq!(sdk.prompts(), vec![Prompt::Consent, Prompt::Silent]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_timeout() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test").holding_requests());
        let mut settings = settings();
        settings.token_timeout = Duration::from_secs(30);
        let client = CalendarAuthClient::new(sdk, settings);

        let err = client.access_token().await.unwrap_err();
        assert_eq!(err, AuthFlowError::Auth(AuthError::Timeout(30)));
        assert_eq!(client.state(), AuthState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_returns_to_ready() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test").holding_requests());
        let client = client_with(sdk.clone());

        let abandoned = tokio::time::timeout(Duration::from_secs(1), client.access_token()).await;

        assert!(abandoned.is_err());
        assert_eq!(sdk.pending_requests(), 1);
        assert_eq!(client.state(), AuthState::Ready);

        // The gate was released too, so a fresh request goes out
        let next = tokio::spawn({
            let client = Arc::new(client);
            async move { client.access_token().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sdk.pending_requests(), 2);
        next.abort();
    }

    #[tokio::test]
    async fn test_sign_out_forces_consent() {
        let sdk = Arc::new(FakeIdentitySdk::new("http://calendar.test"));
        let client = client_with(sdk.clone());

        client.access_token().await.unwrap();
        client.sign_out();
        assert_eq!(client.cached_token(), None);

        client.access_token().await.unwrap();
        assert_eq!(sdk.prompts(), vec![Prompt::Consent, Prompt::Consent]);
    }
}
