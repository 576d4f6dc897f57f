//! The provider SDK seam.
//!
//! Google ships two pieces: a generic API client and an identity/token
//! service. Anything that can load, initialize and answer token requests
//! can stand in for them.

use async_trait::async_trait;
use tokio::sync::oneshot;

use kindred_core::{AuthError, InitError};

/// How a token request should treat the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Force the interactive consent screen.
    Consent,
    /// Renew without user interaction.
    Silent,
}

impl Prompt {
    /// The value the OAuth `prompt` parameter carries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Consent => "consent",
            Prompt::Silent => "",
        }
    }
}

/// What the identity service hands back to a token callback.
///
/// Errors arrive as data, not as a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResponse {
    Granted {
        access_token: String,
        expires_in: Option<u64>,
    },
    Error {
        error: String,
        description: Option<String>,
    },
}

impl TokenResponse {
    pub fn granted(access_token: impl Into<String>) -> Self {
        TokenResponse::Granted {
            access_token: access_token.into(),
            expires_in: None,
        }
    }

    pub fn error(error: impl Into<String>, description: Option<String>) -> Self {
        TokenResponse::Error {
            error: error.into(),
            description,
        }
    }
}

/// One-shot callback a token request resolves.
#[derive(Debug)]
pub struct TokenCallback {
    tx: oneshot::Sender<TokenResponse>,
}

impl TokenCallback {
    pub fn channel() -> (Self, oneshot::Receiver<TokenResponse>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Completes once the waiting side has given up.
    pub async fn closed(&mut self) {
        self.tx.closed().await;
    }

    /// Deliver the response. A caller that stopped waiting just misses it.
    pub fn resolve(self, response: TokenResponse) {
        if self.tx.send(response).is_err() {
            tracing::debug!("Token callback fired after its caller went away");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub api_key: String,
    /// Discovery document describing the REST API
    pub discovery_doc: String,
}

/// What API client initialization learned from the discovery document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClientInfo {
    /// REST root for calendar calls, without a trailing slash
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct TokenClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Space-separated OAuth scopes
    pub scope: String,
    pub redirect_port: u16,
}

/// The provider SDKs behind one interface.
#[async_trait]
pub trait IdentitySdk: Send + Sync {
    /// Load the generic API client.
    async fn load_api_client(&self) -> Result<(), InitError>;

    /// Load the identity/token service.
    async fn load_identity_service(&self) -> Result<(), InitError>;

    /// Initialize the API client with a key and discovery document.
    async fn init_client(&self, config: &ApiClientConfig) -> Result<ApiClientInfo, InitError>;

    /// Build the token client bound to a client id and scope set.
    async fn init_token_client(&self, config: &TokenClientConfig) -> Result<(), InitError>;

    /// Dispatch a token request; the provider resolves `callback` later.
    ///
    /// An `Err` means the request never went out.
    fn request_access_token(
        &self,
        prompt: Prompt,
        callback: TokenCallback,
    ) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_values() {
        assert_eq!(Prompt::Consent.as_str(), "consent");
        assert_eq!(Prompt::Silent.as_str(), "");
    }

    #[tokio::test]
    async fn test_callback_delivers_once() {
        let (callback, rx) = TokenCallback::channel();
        callback.resolve(TokenResponse::granted("abc"));
        assert_eq!(rx.await.ok(), Some(TokenResponse::granted("abc")));
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let (callback, rx) = TokenCallback::channel();
        drop(rx);
        callback.resolve(TokenResponse::error("access_denied", None));
    }
}
