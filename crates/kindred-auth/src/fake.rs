//! In-memory `IdentitySdk` for tests. Never touches the network.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use kindred_core::{AuthError, InitError};

use crate::sdk::{
    ApiClientConfig, ApiClientInfo, IdentitySdk, Prompt, TokenCallback, TokenClientConfig,
    TokenResponse,
};

/// Which init step should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    ApiClientLoad,
    IdentityServiceLoad,
    ClientInit,
    TokenClientInit,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub load_api_client: usize,
    pub load_identity_service: usize,
    pub init_client: usize,
    pub init_token_client: usize,
}

#[derive(Default)]
struct State {
    counts: CallCounts,
    prompts: Vec<Prompt>,
    responses: VecDeque<TokenResponse>,
    pending: VecDeque<TokenCallback>,
    issued: usize,
    last_client_config: Option<ApiClientConfig>,
    last_token_config: Option<TokenClientConfig>,
}

pub struct FakeIdentitySdk {
    base_url: String,
    fail_at: Option<FailAt>,
    load_delay: Duration,
    hold_requests: bool,
    state: Mutex<State>,
}

impl FakeIdentitySdk {
    /// A fake whose API client points calendar calls at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            fail_at: None,
            load_delay: Duration::ZERO,
            hold_requests: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Make each loader sleep before answering.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Keep token callbacks pending until `release` is called.
    pub fn holding_requests(mut self) -> Self {
        self.hold_requests = true;
        self
    }

    /// Queue the answer for the next token request. Without one queued,
    /// requests are granted `fake-token-<n>`.
    pub fn push_response(&self, response: TokenResponse) {
        self.state.lock().responses.push_back(response);
    }

    /// Resolve the oldest held request. Returns false if none was pending.
    pub fn release(&self, response: TokenResponse) -> bool {
        let callback = self.state.lock().pending.pop_front();
        match callback {
            Some(callback) => {
                callback.resolve(response);
                true
            }
            None => false,
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.state.lock().prompts.clone()
    }

    pub fn call_counts(&self) -> CallCounts {
        self.state.lock().counts.clone()
    }

    pub fn last_client_config(&self) -> Option<ApiClientConfig> {
        self.state.lock().last_client_config.clone()
    }

    pub fn last_token_config(&self) -> Option<TokenClientConfig> {
        self.state.lock().last_token_config.clone()
    }

    fn fails(&self, step: FailAt) -> bool {
        self.fail_at == Some(step)
    }
}

#[async_trait]
impl IdentitySdk for FakeIdentitySdk {
    async fn load_api_client(&self) -> Result<(), InitError> {
        self.state.lock().counts.load_api_client += 1;
        tokio::time::sleep(self.load_delay).await;
        if self.fails(FailAt::ApiClientLoad) {
            return Err(InitError::ApiClientLoad("script failed to load".into()));
        }
        Ok(())
    }

    async fn load_identity_service(&self) -> Result<(), InitError> {
        self.state.lock().counts.load_identity_service += 1;
        tokio::time::sleep(self.load_delay).await;
        if self.fails(FailAt::IdentityServiceLoad) {
            return Err(InitError::IdentityServiceLoad("script failed to load".into()));
        }
        Ok(())
    }

    async fn init_client(&self, config: &ApiClientConfig) -> Result<ApiClientInfo, InitError> {
        {
            let mut state = self.state.lock();
            state.counts.init_client += 1;
            state.last_client_config = Some(config.clone());
        }
        if self.fails(FailAt::ClientInit) {
            return Err(InitError::ClientInit("API key not valid".into()));
        }
        Ok(ApiClientInfo {
            base_url: self.base_url.clone(),
        })
    }

    async fn init_token_client(&self, config: &TokenClientConfig) -> Result<(), InitError> {
        {
            let mut state = self.state.lock();
            state.counts.init_token_client += 1;
            state.last_token_config = Some(config.clone());
        }
        if self.fails(FailAt::TokenClientInit) {
            return Err(InitError::TokenClientInit("invalid client id".into()));
        }
        Ok(())
    }

    fn request_access_token(
        &self,
        prompt: Prompt,
        callback: TokenCallback,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock();
        state.prompts.push(prompt);

        if self.hold_requests {
            state.pending.push_back(callback);
            return Ok(());
        }

        state.issued += 1;
        let response = state
            .responses
            .pop_front()
            .unwrap_or_else(|| TokenResponse::granted(format!("fake-token-{}", state.issued)));
        drop(state);

        callback.resolve(response);
        Ok(())
    }
}
