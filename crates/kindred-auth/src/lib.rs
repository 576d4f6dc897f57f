//! Google Calendar authentication for Kindred.
//!
//! `CalendarAuthClient` owns the load/init sequence of the provider SDKs and
//! hands out bearer tokens. The SDKs themselves sit behind `IdentitySdk`.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod google;
pub mod sdk;

pub use client::{AuthSettings, AuthState, CalendarAuthClient};
pub use error::AuthFlowError;
pub use google::{GoogleEndpoints, GoogleIdentitySdk, TokenSet};
pub use sdk::{
    ApiClientConfig, ApiClientInfo, IdentitySdk, Prompt, TokenCallback, TokenClientConfig,
    TokenResponse,
};
