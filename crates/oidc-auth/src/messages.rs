//! Request and response messages of the auth RPCs

use serde::{Deserialize, Serialize};

/// Empty request/response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyMessage {}

/// Response of `begin_auth`: where to send the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUrlMessage {
    pub url: String,
}

/// Request of `exchange_code`, as received on the redirect callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCodeMessage {
    pub code: String,
    pub state: String,
}

// The authorization code is a credential until redeemed.
impl std::fmt::Debug for ExchangeCodeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCodeMessage")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Response of `get_user_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubjectMessage {
    pub subject: String,
}
