//! Authorization code redemption at the provider's token endpoint
//!
//! The client authenticates with HTTP Basic credentials and proves
//! possession of the PKCE verifier. No refresh grant lives here: tokens are
//! handed to the browser and refreshing them is the client's concern.

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::OAuthConfig;

#[derive(Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Tokens issued by the provider. `refresh_token` is empty when the
/// provider did not issue one.
#[derive(Debug)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub token_type: String,
    /// Seconds until the access token expires, when the provider says.
    pub expires_in: Option<u64>,
}

impl TryFrom<RawTokenResponse> for TokenResponse {
    type Error = Error;

    fn try_from(raw: RawTokenResponse) -> Result<Self> {
        if raw.access_token.is_empty() {
            return Err(Error::TokenExchange(
                "server response missing access_token".into(),
            ));
        }

        Ok(Self {
            access_token: Secret::new(raw.access_token),
            refresh_token: Secret::new(raw.refresh_token.unwrap_or_default()),
            token_type: raw.token_type.unwrap_or_else(|| "Bearer".into()),
            expires_in: raw.expires_in,
        })
    }
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&config.token_endpoint)
        .basic_auth(&config.client_id, Some(config.client_secret.expose()))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("code_verifier", verifier),
            ("client_id", config.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let raw = response
        .json::<RawTokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

    let tokens = TokenResponse::try_from(raw)?;
    debug!(
        token_type = %tokens.token_type,
        expires_in = ?tokens.expires_in,
        has_refresh_token = !tokens.refresh_token.is_empty(),
        "authorization code exchanged"
    );
    Ok(tokens)
}
