//! Error types for the OIDC flow

/// Errors from discovery, token exchange and user-info calls.
///
/// Messages may include provider responses but never tokens, codes or
/// verifiers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("user info request failed: {0}")]
    UserInfo(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Result alias for OIDC operations.
pub type Result<T> = std::result::Result<T, Error>;
