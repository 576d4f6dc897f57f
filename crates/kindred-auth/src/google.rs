//! Google implementation of `IdentitySdk`.
//!
//! The "API client" is the Calendar discovery document and the "identity
//! service" is Google's OpenID configuration. Consent runs the
//! authorization-code + PKCE flow through the system browser with a
//! loopback redirect; silent renewal uses the refresh token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::TokenResponse as _;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenUrl,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use warp::Filter;

use kindred_core::{AuthError, InitError};

use crate::sdk::{
    ApiClientConfig, ApiClientInfo, IdentitySdk, Prompt, TokenCallback, TokenClientConfig,
    TokenResponse,
};

const DISCOVERY_DIRECTORY_URL: &str = "https://www.googleapis.com/discovery/v1/apis";
const OPENID_CONFIGURATION_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const CALENDAR_API_NAME: &str = "calendar";

/// Refresh this many seconds before the access token actually expires.
const REFRESH_BUFFER_SECS: i64 = 300;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Where the loaders fetch from. Overridable so tests can point at a mock.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub discovery_directory: String,
    pub openid_configuration: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            discovery_directory: DISCOVERY_DIRECTORY_URL.to_string(),
            openid_configuration: OPENID_CONFIGURATION_URL.to_string(),
        }
    }
}

/// Tokens from the last successful grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    pub refresh_token: Option<String>,

    /// Unix timestamp
    pub expires_at: i64,

    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Within 5 minutes of expiry
    pub fn needs_refresh(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - REFRESH_BUFFER_SECS
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }

    fn remaining_secs(&self) -> u64 {
        let remaining = self.expires_at - chrono::Utc::now().timestamp();
        u64::try_from(remaining).unwrap_or(0)
    }

    fn from_grant(grant: &BasicTokenResponse, previous_refresh: Option<String>) -> Self {
        let expires_in = grant
            .expires_in()
            .map(|d| d.as_secs() as i64)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Self {
            access_token: grant.access_token().secret().clone(),
            // Google omits the refresh token on refresh grants
            refresh_token: grant
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(previous_refresh),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            scopes: grant
                .scopes()
                .map(|s| s.iter().map(|scope| scope.to_string()).collect())
                .unwrap_or_default(),
        }
    }

    fn granted(&self) -> TokenResponse {
        TokenResponse::Granted {
            access_token: self.access_token.clone(),
            expires_in: Some(self.remaining_secs()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryList {
    #[serde(default)]
    items: Vec<DirectoryItem>,
}

#[derive(Debug, Deserialize)]
struct DirectoryItem {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenIdConfiguration {
    authorization_endpoint: String,
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryDocument {
    root_url: String,
    service_path: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: String,
}

/// Query string Google appends to the loopback redirect.
#[derive(Debug, Default, Clone, Deserialize)]
struct ConsentRedirect {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct TokenClient {
    oauth: BasicClient,
    scopes: Vec<String>,
    redirect_port: u16,
}

/// A consent request that has been built but not yet answered.
struct PendingConsent {
    url: String,
    csrf: CsrfToken,
    verifier: PkceCodeVerifier,
}

struct Inner {
    http: reqwest::Client,
    endpoints: GoogleEndpoints,
    api_loaded: AtomicBool,
    openid: RwLock<Option<OpenIdConfiguration>>,
    token_client: RwLock<Option<Arc<TokenClient>>>,
    tokens: RwLock<Option<TokenSet>>,
}

/// Google's discovery + OAuth2 endpoints behind `IdentitySdk`.
#[derive(Clone)]
pub struct GoogleIdentitySdk {
    inner: Arc<Inner>,
}

impl GoogleIdentitySdk {
    pub fn new(http: reqwest::Client, endpoints: GoogleEndpoints) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                endpoints,
                api_loaded: AtomicBool::new(false),
                openid: RwLock::new(None),
                token_client: RwLock::new(None),
                tokens: RwLock::new(None),
            }),
        }
    }

    /// Seed tokens from an earlier session.
    pub fn with_tokens(self, tokens: TokenSet) -> Self {
        *self.inner.tokens.write() = Some(tokens);
        self
    }

    /// Tokens from the most recent grant, for an embedder that persists them.
    pub fn tokens(&self) -> Option<TokenSet> {
        self.inner.tokens.read().clone()
    }
}

#[async_trait]
impl IdentitySdk for GoogleIdentitySdk {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn load_api_client(&self) -> Result<(), InitError> {
        let inner = &self.inner;
        let response = inner
            .http
            .get(&inner.endpoints.discovery_directory)
            .query(&[("name", CALENDAR_API_NAME), ("preferred", "true")])
            .send()
            .await
            .map_err(|e| InitError::ApiClientLoad(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InitError::ApiClientLoad(format!(
                "discovery directory returned {}",
                response.status()
            )));
        }

        let list: DirectoryList = response
            .json()
            .await
            .map_err(|e| InitError::ApiClientLoad(format!("unreadable discovery directory: {}", e)))?;

        if !list.items.iter().any(|item| item.name == CALENDAR_API_NAME) {
            return Err(InitError::ApiClientLoad(
                "calendar API is not listed in the discovery directory".into(),
            ));
        }

        inner.api_loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn load_identity_service(&self) -> Result<(), InitError> {
        let inner = &self.inner;
        let response = inner
            .http
            .get(&inner.endpoints.openid_configuration)
            .send()
            .await
            .map_err(|e| InitError::IdentityServiceLoad(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InitError::IdentityServiceLoad(format!(
                "OpenID configuration returned {}",
                response.status()
            )));
        }

        let openid: OpenIdConfiguration = response.json().await.map_err(|e| {
            InitError::IdentityServiceLoad(format!("unreadable OpenID configuration: {}", e))
        })?;

        *inner.openid.write() = Some(openid);
        Ok(())
    }

    #[tracing::instrument(skip(self, config), level = "debug")]
    async fn init_client(&self, config: &ApiClientConfig) -> Result<ApiClientInfo, InitError> {
        let inner = &self.inner;
        if !inner.api_loaded.load(Ordering::SeqCst) {
            return Err(InitError::ClientInit("API client is not loaded".into()));
        }

        let response = inner
            .http
            .get(&config.discovery_doc)
            .query(&[("key", config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| InitError::ClientInit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GoogleErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("discovery document returned {}", status));
            return Err(InitError::ClientInit(message));
        }

        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| InitError::ClientInit(format!("unreadable discovery document: {}", e)))?;

        let base_url = format!("{}{}", doc.root_url, doc.service_path)
            .trim_end_matches('/')
            .to_string();
        Ok(ApiClientInfo { base_url })
    }

    #[tracing::instrument(skip(self, config), level = "debug")]
    async fn init_token_client(&self, config: &TokenClientConfig) -> Result<(), InitError> {
        let openid = self
            .inner
            .openid
            .read()
            .clone()
            .ok_or_else(|| InitError::TokenClientInit("identity service is not loaded".into()))?;

        let auth_url = AuthUrl::new(openid.authorization_endpoint)
            .map_err(|e| InitError::TokenClientInit(format!("invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(openid.token_endpoint)
            .map_err(|e| InitError::TokenClientInit(format!("invalid token URL: {}", e)))?;
        let redirect = RedirectUrl::new(format!("http://127.0.0.1:{}/callback", config.redirect_port))
            .map_err(|e| InitError::TokenClientInit(format!("invalid redirect URI: {}", e)))?;

        if config.client_id.trim().is_empty() {
            return Err(InitError::TokenClientInit("client id is empty".into()));
        }

        let oauth = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            config.client_secret.clone().map(ClientSecret::new),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(redirect);

        *self.inner.token_client.write() = Some(Arc::new(TokenClient {
            oauth,
            scopes: config.scope.split_whitespace().map(str::to_string).collect(),
            redirect_port: config.redirect_port,
        }));
        Ok(())
    }

    fn request_access_token(
        &self,
        prompt: Prompt,
        callback: TokenCallback,
    ) -> Result<(), AuthError> {
        let client = self
            .inner
            .token_client
            .read()
            .clone()
            .ok_or_else(|| AuthError::RequestFailed("token client is not initialized".into()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let inner = self.inner.clone();
        runtime.spawn(async move {
            let mut callback = callback;
            let response = tokio::select! {
                response = inner.respond(&client, prompt) => response,
                _ = callback.closed() => {
                    tracing::debug!("Token request abandoned by caller");
                    return;
                }
            };
            callback.resolve(response);
        });
        Ok(())
    }
}

impl Inner {
    async fn respond(&self, client: &TokenClient, prompt: Prompt) -> TokenResponse {
        match prompt {
            Prompt::Silent => self.renew_silently(client).await,
            Prompt::Consent => self.run_consent(client).await,
        }
    }

    async fn renew_silently(&self, client: &TokenClient) -> TokenResponse {
        let cached = self.tokens.read().clone();
        let Some(tokens) = cached else {
            return TokenResponse::error("interaction_required", Some("no previous grant".into()));
        };

        if !tokens.needs_refresh() {
            return tokens.granted();
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            return TokenResponse::error(
                "interaction_required",
                Some("access token expired and no refresh token is available".into()),
            );
        };

        tracing::info!("Refreshing Google access token");
        let result = client
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await;

        match result {
            Ok(grant) => self.store(TokenSet::from_grant(&grant, Some(refresh_token))),
            Err(e) => {
                let response = token_error(e);
                if matches!(&response, TokenResponse::Error { error, .. } if error == "invalid_grant") {
                    *self.tokens.write() = None;
                }
                response
            }
        }
    }

    async fn run_consent(&self, client: &TokenClient) -> TokenResponse {
        let pending = authorization_request(client);

        let (tx, rx) = oneshot::channel::<ConsentRedirect>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));

        let routes = warp::get()
            .and(warp::path("callback"))
            .and(warp::query::<ConsentRedirect>())
            .and(warp::any().map(move || tx.clone()))
            .and_then(
                |redirect: ConsentRedirect,
                 tx: Arc<tokio::sync::Mutex<Option<oneshot::Sender<ConsentRedirect>>>>| async move {
                    let denied = redirect.error.is_some();
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(redirect);
                    }
                    let page = if denied {
                        "<html><body><h1>Calendar access was not granted.</h1><p>You can close this window.</p></body></html>"
                    } else {
                        "<html><body><h1>Calendar connected!</h1><p>You can close this window and return to Kindred.</p></body></html>"
                    };
                    Ok::<_, warp::Rejection>(warp::reply::html(page))
                },
            );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = warp::serve(routes).try_bind_with_graceful_shutdown(
            ([127, 0, 0, 1], client.redirect_port),
            async move {
                shutdown_rx.await.ok();
            },
        );
        let server = match server {
            Ok((addr, server)) => {
                tracing::debug!(%addr, "Listening for OAuth redirect");
                server
            }
            Err(e) => {
                return TokenResponse::error(
                    "server_error",
                    Some(format!("could not listen for the OAuth redirect: {}", e)),
                );
            }
        };
        tokio::spawn(server);

        tracing::info!("Opening browser for Google Calendar consent...");
        if let Err(e) = webbrowser::open(&pending.url) {
            tracing::warn!("Failed to open browser: {}", e);
            tracing::info!("Open this URL to continue: {}", pending.url);
        }

        let redirect = rx.await;
        let _ = shutdown_tx.send(());

        match redirect {
            Ok(redirect) => self.complete_consent(client, pending, redirect).await,
            Err(_) => TokenResponse::error("server_error", Some("OAuth redirect listener stopped".into())),
        }
    }

    async fn complete_consent(
        &self,
        client: &TokenClient,
        pending: PendingConsent,
        redirect: ConsentRedirect,
    ) -> TokenResponse {
        if let Some(error) = redirect.error {
            tracing::warn!(%error, "Consent was not granted");
            return TokenResponse::error(error, redirect.error_description);
        }

        if redirect.state.as_deref() != Some(pending.csrf.secret().as_str()) {
            return TokenResponse::error("invalid_state", Some("CSRF token mismatch".into()));
        }

        let Some(code) = redirect.code else {
            return TokenResponse::error("invalid_request", Some("redirect carried no code".into()));
        };

        let result = client
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pending.verifier)
            .request_async(async_http_client)
            .await;

        match result {
            Ok(grant) => {
                tracing::info!("Google Calendar consent completed");
                self.store(TokenSet::from_grant(&grant, None))
            }
            Err(e) => token_error(e),
        }
    }

    fn store(&self, tokens: TokenSet) -> TokenResponse {
        let response = tokens.granted();
        *self.tokens.write() = Some(tokens);
        response
    }
}

fn authorization_request(client: &TokenClient) -> PendingConsent {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let (url, csrf) = client
        .oauth
        .authorize_url(CsrfToken::new_random)
        .add_scopes(client.scopes.iter().cloned().map(Scope::new))
        .add_extra_param("prompt", Prompt::Consent.as_str())
        .add_extra_param("access_type", "offline")
        .set_pkce_challenge(challenge)
        .url();

    PendingConsent {
        url: url.to_string(),
        csrf,
        verifier,
    }
}

/// Turn a failed grant into the error-as-data shape callbacks carry.
fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> TokenResponse
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => TokenResponse::error(
            response.error().to_string(),
            response.error_description().cloned(),
        ),
        RequestTokenError::Request(e) => TokenResponse::error("request_failed", Some(e.to_string())),
        RequestTokenError::Parse(e, _) => {
            TokenResponse::error("invalid_response", Some(e.to_string()))
        }
        RequestTokenError::Other(message) => TokenResponse::error("request_failed", Some(message)),
    }
}
