//! OpenID Connect Authorization Code + PKCE flow for the dig-inv gateway
//!
//! The server keeps no session state. Everything the flow needs between
//! calls lives in four browser cookies, moved through the RPC metadata
//! side-channel of [`rpc::CallContext`]:
//!
//! 1. `AuthService::begin_auth` generates a CSRF `state` and PKCE `verifier`,
//!    stores both as cookies and returns the authorization URL
//! 2. `AuthService::exchange_code` checks the returned `state` against the
//!    cookie, redeems the code with the verifier, stores `token` and
//!    `refresh_token` and clears `state`/`verifier`
//! 3. `AuthService::get_user_info` resolves the `token` cookie to a subject
//! 4. `AuthService::logout` clears all four cookies
//!
//! Provider endpoints come from an [`OidcContextProvider`], normally a
//! [`DiscoveryProvider`] performing issuer discovery on every call.

pub mod constants;
pub mod discovery;
pub mod error;
pub mod messages;
pub mod pkce;
pub mod provider;
pub mod service;
pub mod token;
pub mod userinfo;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use constants::*;
pub use discovery::{DiscoveryCache, ProviderMetadata, discover};
pub use error::{Error, Result};
pub use messages::{AuthUrlMessage, EmptyMessage, ExchangeCodeMessage, UserSubjectMessage};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use provider::{
    DiscoveryProvider, OAuthConfig, OidcContext, OidcContextProvider, OidcSettings,
    StaticProvider,
};
pub use service::AuthService;
pub use token::{TokenResponse, exchange_code};
pub use userinfo::{UserInfo, fetch_user_info};
