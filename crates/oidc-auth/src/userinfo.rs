//! UserInfo endpoint client

use serde::Deserialize;

use crate::discovery::ProviderMetadata;
use crate::error::{Error, Result};

/// Claims returned by the UserInfo endpoint. Only `sub` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
}

/// Fetch the claims for `access_token`. No refresh is attempted on failure.
pub async fn fetch_user_info(
    client: &reqwest::Client,
    metadata: &ProviderMetadata,
    access_token: &str,
) -> Result<UserInfo> {
    let endpoint = metadata.userinfo_endpoint.as_deref().ok_or_else(|| {
        Error::UserInfo(format!(
            "provider {} does not advertise a userinfo endpoint",
            metadata.issuer
        ))
    })?;

    let response = client
        .get(endpoint)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::Http(format!("userinfo request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::UserInfo(format!("{endpoint} returned {status}")));
    }

    let info = response
        .json::<UserInfo>()
        .await
        .map_err(|e| Error::UserInfo(format!("invalid userinfo response: {e}")))?;

    if info.sub.is_empty() {
        return Err(Error::UserInfo("userinfo response has empty sub".into()));
    }

    Ok(info)
}
