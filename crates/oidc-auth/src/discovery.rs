//! OpenID Connect issuer discovery
//!
//! Fetches `<issuer>/.well-known/openid-configuration` and checks the
//! document names the issuer it was fetched from. [`DiscoveryCache`] can
//! keep documents for a TTL; without it every call goes to the network.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::constants::WELL_KNOWN_PATH;
use crate::error::{Error, Result};

/// Subset of the discovery document the flow relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Discovery document URL for an issuer. A trailing `/` on the issuer is ignored.
pub fn discovery_url(issuer_url: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", issuer_url.trim_end_matches('/'))
}

/// Fetch and validate the discovery document for `issuer_url`.
pub async fn discover(client: &reqwest::Client, issuer_url: &str) -> Result<ProviderMetadata> {
    let url = discovery_url(issuer_url);

    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            warn!(issuer = issuer_url, error = %e, "discovery request failed");
            Error::DiscoveryFailed(format!("request to {url} failed: {e}"))
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::DiscoveryFailed(format!(
            "{url} returned {status}"
        )));
    }

    let metadata = response.json::<ProviderMetadata>().await.map_err(|e| {
        warn!(issuer = issuer_url, error = %e, "discovery document unparseable");
        Error::DiscoveryFailed(format!("invalid discovery document: {e}"))
    })?;

    let expected = issuer_url.trim_end_matches('/');
    let actual = metadata.issuer.trim_end_matches('/');
    if expected != actual {
        return Err(Error::DiscoveryFailed(format!(
            "issuer mismatch: expected {expected}, got {actual}"
        )));
    }

    debug!(issuer = expected, "discovered provider metadata");
    Ok(metadata)
}

struct CachedMetadata {
    metadata: ProviderMetadata,
    fetched_at: Instant,
}

/// Per-issuer discovery cache with a fixed TTL.
///
/// Failed lookups are never cached.
pub struct DiscoveryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedMetadata>>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached metadata for `issuer_url`, discovering it when absent or stale.
    pub async fn get_or_discover(
        &self,
        client: &reqwest::Client,
        issuer_url: &str,
    ) -> Result<ProviderMetadata> {
        let key = issuer_url.trim_end_matches('/').to_owned();

        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&key)
                && cached.fetched_at.elapsed() < self.ttl
            {
                trace!(issuer = %key, "discovery cache hit");
                return Ok(cached.metadata.clone());
            }
        }

        let metadata = discover(client, issuer_url).await?;

        let mut entries = self.entries.write().await;
        entries.retain(|_, cached| cached.fetched_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CachedMetadata {
                metadata: metadata.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(metadata)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
