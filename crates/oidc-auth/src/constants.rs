//! Cookie names and protocol constants

/// Access token cookie.
pub const TOKEN_COOKIE: &str = "token";

/// Refresh token cookie. Stored for the client; never used server-side.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// PKCE verifier cookie, single-use.
pub const VERIFIER_COOKIE: &str = "verifier";

/// CSRF state cookie, single-use.
pub const STATE_COOKIE: &str = "state";

/// Every cookie that makes up a session, in the order `logout` clears them.
pub const SESSION_COOKIES: [&str; 4] = [
    TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
    VERIFIER_COOKIE,
    STATE_COOKIE,
];

/// Discovery document path, appended to the issuer URL.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &str = "openid profile email";

/// Random bytes in a CSRF state value (22 base64url characters).
pub const STATE_BYTES: usize = 16;

/// Random bytes in a PKCE verifier (43 base64url characters, the RFC 7636 minimum length).
pub const VERIFIER_BYTES: usize = 32;
