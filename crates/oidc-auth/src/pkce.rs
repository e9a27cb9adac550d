//! PKCE (RFC 7636) and CSRF state generation, authorization URL assembly
//!
//! The verifier and state are both opaque base64url strings drawn from the
//! thread-local CSPRNG. They travel to the browser as cookies and come back
//! on the callback; the challenge goes to the provider in the authorization
//! URL so it can check the later token request came from the same party.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::{STATE_BYTES, VERIFIER_BYTES};
use crate::error::{Error, Result};
use crate::provider::OAuthConfig;

/// Generate a PKCE code verifier: 32 random bytes, base64url without padding.
pub fn generate_verifier() -> String {
    random_token::<VERIFIER_BYTES>()
}

/// Generate a CSRF state value: 16 random bytes, base64url without padding.
///
/// Panics if the OS entropy source fails. Handing out predictable state
/// values is not an option, so the process goes down instead.
pub fn generate_state() -> String {
    random_token::<STATE_BYTES>()
}

fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization URL for an S256 PKCE request.
///
/// Requests offline access and forces the consent prompt so the provider
/// issues a refresh token. Query parameters already present on the
/// authorization endpoint are kept.
pub fn build_authorization_url(config: &OAuthConfig, state: &str, challenge: &str) -> Result<String> {
    let mut url = Url::parse(&config.authorization_endpoint).map_err(|e| {
        Error::Config(format!(
            "invalid authorization endpoint {}: {e}",
            config.authorization_endpoint
        ))
    })?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("state", state)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}
