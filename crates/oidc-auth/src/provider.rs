//! OIDC context providers
//!
//! [`AuthService`](crate::AuthService) does not know where provider
//! endpoints come from. It asks an [`OidcContextProvider`] once per call for
//! the client configuration, the provider metadata and a fresh PKCE
//! verifier:
//!
//! - [`DiscoveryProvider`] runs issuer discovery, optionally through a
//!   [`DiscoveryCache`]
//! - [`StaticProvider`] serves fixed metadata without touching the network

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::{debug, error};

use crate::constants::DEFAULT_SCOPES;
use crate::discovery::{DiscoveryCache, ProviderMetadata, discover};
use crate::error::{Error, Result};
use crate::pkce::generate_verifier;

/// Client registration at the identity provider.
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OidcSettings {
    /// Split a space-joined scope string, falling back to [`DEFAULT_SCOPES`]
    /// when it holds no scopes.
    pub fn parse_scopes(scopes: &str) -> Vec<String> {
        let parsed: Vec<String> = scopes.split_whitespace().map(str::to_owned).collect();
        if parsed.is_empty() {
            return Self::parse_scopes(DEFAULT_SCOPES);
        }
        parsed
    }

    /// Reject settings with an empty required value, naming the first one.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("issuer URL", self.issuer_url.is_empty()),
            ("client id", self.client_id.is_empty()),
            ("client secret", self.client_secret.is_empty()),
            ("redirect URL", self.redirect_url.is_empty()),
            ("scopes", self.scopes.is_empty()),
        ];

        match required.iter().find(|(_, empty)| *empty) {
            Some((name, _)) => Err(Error::Config(format!("OIDC {name} is not configured"))),
            None => Ok(()),
        }
    }
}

/// OAuth2 client configuration for one call.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn from_metadata(settings: &OidcSettings, metadata: &ProviderMetadata) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_url: settings.redirect_url.clone(),
            authorization_endpoint: metadata.authorization_endpoint.clone(),
            token_endpoint: metadata.token_endpoint.clone(),
            scopes: settings.scopes.clone(),
        }
    }
}

/// Everything one flow step needs from the provider.
#[derive(Debug)]
pub struct OidcContext {
    pub config: OAuthConfig,
    pub metadata: ProviderMetadata,
    /// Freshly generated for this call. Only `begin_auth` uses it.
    pub verifier: Secret<String>,
}

/// Source of [`OidcContext`]s.
///
/// Uses `Pin<Box<dyn Future>>` so it can be held as `Arc<dyn OidcContextProvider>`.
pub trait OidcContextProvider: Send + Sync {
    fn resolve(&self) -> Pin<Box<dyn Future<Output = Result<OidcContext>> + Send + '_>>;
}

/// Provider that performs issuer discovery on every call.
pub struct DiscoveryProvider {
    settings: OidcSettings,
    http_client: reqwest::Client,
    cache: Option<DiscoveryCache>,
}

impl DiscoveryProvider {
    pub fn new(settings: OidcSettings, http_client: reqwest::Client) -> Self {
        Self {
            settings,
            http_client,
            cache: None,
        }
    }

    /// Cache discovery documents for `ttl`. A zero TTL disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = (!ttl.is_zero()).then(|| DiscoveryCache::new(ttl));
        self
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    async fn metadata(&self) -> Result<ProviderMetadata> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_discover(&self.http_client, &self.settings.issuer_url)
                    .await
            }
            None => discover(&self.http_client, &self.settings.issuer_url).await,
        }
    }
}

impl OidcContextProvider for DiscoveryProvider {
    fn resolve(&self) -> Pin<Box<dyn Future<Output = Result<OidcContext>> + Send + '_>> {
        Box::pin(async move {
            self.settings.validate()?;

            let metadata = self.metadata().await.inspect_err(|e| {
                error!(issuer = %self.settings.issuer_url, error = %e, "failed to create OIDC provider");
            })?;

            Ok(OidcContext {
                config: OAuthConfig::from_metadata(&self.settings, &metadata),
                metadata,
                verifier: Secret::new(generate_verifier()),
            })
        })
    }
}

/// Provider with fixed metadata and no network access.
///
/// Useful for providers configured by hand and for substituting
/// deterministic behaviour in tests. The verifier is either fixed or
/// generated per call.
pub struct StaticProvider {
    settings: OidcSettings,
    metadata: ProviderMetadata,
    verifier: Option<String>,
}

impl StaticProvider {
    pub fn new(settings: OidcSettings, metadata: ProviderMetadata) -> Self {
        Self {
            settings,
            metadata,
            verifier: None,
        }
    }

    /// Always hand out `verifier` instead of generating one.
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = Some(verifier.into());
        self
    }
}

impl OidcContextProvider for StaticProvider {
    fn resolve(&self) -> Pin<Box<dyn Future<Output = Result<OidcContext>> + Send + '_>> {
        Box::pin(async move {
            self.settings.validate()?;

            let verifier = self.verifier.clone().unwrap_or_else(generate_verifier);
            debug!(issuer = %self.metadata.issuer, "resolved static OIDC context");

            Ok(OidcContext {
                config: OAuthConfig::from_metadata(&self.settings, &self.metadata),
                metadata: self.metadata.clone(),
                verifier: Secret::new(verifier),
            })
        })
    }
}
