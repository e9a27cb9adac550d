//! Authorization Code + PKCE state machine
//!
//! ```text
//! Anonymous --begin_auth--> PendingCallback { state, verifier }
//! PendingCallback --exchange_code (state matches)--> Authenticated { token, refresh_token }
//! any --logout--> Anonymous
//! ```
//!
//! The server remembers nothing between calls; each step reads the cookies
//! the previous one queued on the [`CallContext`].

use std::sync::Arc;

use rpc::{AuthenticatedSubject, CallContext, Status};
use tracing::{debug, error, info, warn};

use crate::constants::{
    REFRESH_TOKEN_COOKIE, SESSION_COOKIES, STATE_COOKIE, TOKEN_COOKIE, VERIFIER_COOKIE,
};
use crate::messages::{AuthUrlMessage, EmptyMessage, ExchangeCodeMessage, UserSubjectMessage};
use crate::pkce::{build_authorization_url, compute_challenge, generate_state};
use crate::provider::{OidcContext, OidcContextProvider};
use crate::{token, userinfo};

const BEGIN_AUTH: &str = "BeginAuth";
const EXCHANGE_CODE: &str = "ExchangeCode";
const GET_USER_INFO: &str = "GetUserInfo";
const LOGOUT: &str = "Logout";

/// The four auth RPCs.
pub struct AuthService {
    provider: Arc<dyn OidcContextProvider>,
    http_client: reqwest::Client,
}

impl AuthService {
    pub fn new(provider: Arc<dyn OidcContextProvider>, http_client: reqwest::Client) -> Self {
        Self {
            provider,
            http_client,
        }
    }

    async fn oidc_context(&self, operation: &'static str) -> rpc::Result<OidcContext> {
        self.provider.resolve().await.map_err(|e| {
            error!(operation, error = %e, "failed to get OAuth2 config");
            Status::internal("failed to get OAuth2 config")
        })
    }

    /// Start a login: queue `state` and `verifier` cookies and return the
    /// provider URL to send the browser to.
    pub async fn begin_auth(&self, ctx: &mut CallContext) -> rpc::Result<AuthUrlMessage> {
        let state = generate_state();
        let oidc = self.oidc_context(BEGIN_AUTH).await?;

        let challenge = compute_challenge(oidc.verifier.expose());
        let url = build_authorization_url(&oidc.config, &state, &challenge).map_err(|e| {
            error!(operation = BEGIN_AUTH, error = %e, "failed to build authorization URL");
            Status::internal("failed to get OAuth2 config")
        })?;

        ctx.set_cookies(&[
            (STATE_COOKIE, state.as_str()),
            (VERIFIER_COOKIE, oidc.verifier.expose().as_str()),
        ])
        .inspect_err(|e| error!(operation = BEGIN_AUTH, error = %e, "failed to write cookies"))?;

        info!(operation = BEGIN_AUTH, issuer = %oidc.metadata.issuer, "authorization started");
        Ok(AuthUrlMessage { url })
    }

    /// Finish a login started by [`begin_auth`](Self::begin_auth).
    ///
    /// The request `state` must equal the `state` cookie exactly. Nothing is
    /// sent to the provider and no cookie changes unless it does.
    pub async fn exchange_code(
        &self,
        ctx: &mut CallContext,
        request: ExchangeCodeMessage,
    ) -> rpc::Result<EmptyMessage> {
        let verifier = session_cookie(ctx, VERIFIER_COOKIE, EXCHANGE_CODE)?;
        let expected_state = session_cookie(ctx, STATE_COOKIE, EXCHANGE_CODE)?;

        if request.state != expected_state {
            warn!(operation = EXCHANGE_CODE, "state mismatch");
            return Err(Status::unauthenticated("state mismatch"));
        }

        let oidc = self.oidc_context(EXCHANGE_CODE).await?;

        let tokens = token::exchange_code(&self.http_client, &oidc.config, &request.code, &verifier)
            .await
            .map_err(|e| {
                warn!(operation = EXCHANGE_CODE, error = %e, "code exchange failed");
                Status::unauthenticated("failed to exchange authorization code")
            })?;

        ctx.set_cookies(&[
            (TOKEN_COOKIE, tokens.access_token.expose().as_str()),
            (REFRESH_TOKEN_COOKIE, tokens.refresh_token.expose().as_str()),
            (VERIFIER_COOKIE, ""),
            (STATE_COOKIE, ""),
        ])
        .inspect_err(|e| error!(operation = EXCHANGE_CODE, error = %e, "failed to write cookies"))?;

        info!(operation = EXCHANGE_CODE, "session established");
        Ok(EmptyMessage {})
    }

    /// Resolve the `token` cookie to the provider's subject and record it on
    /// the context.
    pub async fn authenticate(&self, ctx: &mut CallContext) -> rpc::Result<AuthenticatedSubject> {
        let access_token = session_cookie(ctx, TOKEN_COOKIE, GET_USER_INFO)?;
        let oidc = self.oidc_context(GET_USER_INFO).await?;

        let info = userinfo::fetch_user_info(&self.http_client, &oidc.metadata, &access_token)
            .await
            .map_err(|e| {
                warn!(operation = GET_USER_INFO, error = %e, "user info lookup failed");
                Status::unauthenticated("failed to get user info")
            })?;

        let subject = AuthenticatedSubject::new(info.sub);
        debug!(operation = GET_USER_INFO, subject = %subject, "authenticated");
        ctx.set_subject(subject.clone());
        Ok(subject)
    }

    pub async fn get_user_info(&self, ctx: &mut CallContext) -> rpc::Result<UserSubjectMessage> {
        let subject = self.authenticate(ctx).await?;
        Ok(UserSubjectMessage {
            subject: subject.into_inner(),
        })
    }

    /// Clear every session cookie, set or not.
    pub async fn logout(&self, ctx: &mut CallContext) -> rpc::Result<EmptyMessage> {
        let cleared = SESSION_COOKIES.map(|name| (name, ""));
        ctx.set_cookies(&cleared)
            .inspect_err(|e| error!(operation = LOGOUT, error = %e, "failed to clear cookies"))?;

        info!(operation = LOGOUT, "session cleared");
        Ok(EmptyMessage {})
    }
}

/// A session cookie the operation cannot proceed without.
///
/// Cleared cookies come back as empty values and count as absent, so a
/// consumed `state` can never match an empty request state.
fn session_cookie(ctx: &CallContext, name: &str, operation: &'static str) -> rpc::Result<String> {
    match ctx.cookie(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => {
            debug!(operation, cookie = name, "session cookie missing");
            Err(Status::unauthenticated(format!("missing {name} cookie")))
        }
    }
}
