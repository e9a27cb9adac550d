//! In-process mock identity provider for unit tests
//!
//! Compiled for this crate's own tests and, behind the `test-util` feature,
//! for dependents that drive the auth flow end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use serde_json::json;
use tokio::net::TcpListener;

use crate::constants::WELL_KNOWN_PATH;
use crate::discovery::ProviderMetadata;
use crate::provider::{OAuthConfig, OidcSettings};

pub const TEST_ACCESS_TOKEN: &str = "test_access_token";
pub const TEST_REFRESH_TOKEN: &str = "test_refresh_token";
pub const TEST_SUBJECT: &str = "test_subject";

pub struct MockOptions {
    /// Paths answered with 500.
    pub failing_paths: Vec<String>,
    /// Issuer advertised in the discovery document instead of the mock's URL.
    pub issuer_override: Option<String>,
    /// When set, token requests with any other `code_verifier` are rejected.
    pub expected_verifier: Option<String>,
    pub accepted_code: String,
    pub omit_refresh_token: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            failing_paths: Vec::new(),
            issuer_override: None,
            expected_verifier: None,
            accepted_code: "test_code".into(),
            omit_refresh_token: false,
        }
    }
}

impl MockOptions {
    pub fn failing(paths: &[&str]) -> Self {
        Self {
            failing_paths: paths.iter().map(|p| (*p).to_owned()).collect(),
            ..Self::default()
        }
    }
}

/// Request counters and the last token request seen.
#[derive(Default)]
pub struct Hits {
    pub discovery: AtomicUsize,
    pub token: AtomicUsize,
    pub userinfo: AtomicUsize,
    token_form: Mutex<HashMap<String, String>>,
    token_authorization: Mutex<Option<String>>,
}

impl Hits {
    pub fn last_token_form(&self) -> HashMap<String, String> {
        self.token_form.lock().unwrap().clone()
    }

    pub fn last_token_authorization(&self) -> Option<String> {
        self.token_authorization.lock().unwrap().clone()
    }
}

struct MockState {
    url: String,
    options: MockOptions,
    hits: Arc<Hits>,
}

impl MockState {
    fn fails(&self, uri: &Uri) -> bool {
        self.options.failing_paths.iter().any(|p| p == uri.path())
    }
}

pub struct MockIdp {
    pub url: String,
    pub hits: Arc<Hits>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockIdp {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Hits::default());

        let state = Arc::new(MockState {
            url: url.clone(),
            options,
            hits: hits.clone(),
        });

        let app = Router::new()
            .route(WELL_KNOWN_PATH, get(discovery))
            .route("/token", post(token))
            .route("/userinfo", get(userinfo))
            .with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, hits, handle }
    }
}

impl Drop for MockIdp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn discovery(State(state): State<Arc<MockState>>, uri: Uri) -> Response {
    state.hits.discovery.fetch_add(1, Ordering::SeqCst);
    if state.fails(&uri) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let issuer = state
        .options
        .issuer_override
        .clone()
        .unwrap_or_else(|| state.url.clone());
    let base = &state.url;

    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{base}/auth"),
        "token_endpoint": format!("{base}/token"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "jwks_uri": format!("{base}/jwks"),
        "scopes_supported": ["openid", "email", "profile", "offline_access"],
        "code_challenge_methods_supported": ["S256"],
    }))
    .into_response()
}

async fn token(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.hits.token.fetch_add(1, Ordering::SeqCst);
    *state.hits.token_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *state.hits.token_form.lock().unwrap() = form.clone();

    if state.fails(&uri) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
    let verifier_ok = state
        .options
        .expected_verifier
        .as_deref()
        .is_none_or(|expected| field("code_verifier") == expected);

    if field("grant_type") != "authorization_code"
        || field("code") != state.options.accepted_code
        || !verifier_ok
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        )
            .into_response();
    }

    let mut body = json!({
        "access_token": TEST_ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if !state.options.omit_refresh_token {
        body["refresh_token"] = json!(TEST_REFRESH_TOKEN);
    }
    Json(body).into_response()
}

async fn userinfo(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.hits.userinfo.fetch_add(1, Ordering::SeqCst);
    if state.fails(&uri) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_ACCESS_TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "sub": TEST_SUBJECT,
        "email": "test@test.mail",
        "email_verified": true,
        "name": "Test User",
    }))
    .into_response()
}

pub fn oidc_settings(issuer_url: &str) -> OidcSettings {
    OidcSettings {
        issuer_url: issuer_url.into(),
        client_id: "test_client_id".into(),
        client_secret: Secret::from("test_client_secret"),
        redirect_url: "http://testing.localhost/login".into(),
        scopes: OidcSettings::parse_scopes("openid email profile offline_access"),
    }
}

pub fn provider_metadata(base: &str) -> ProviderMetadata {
    ProviderMetadata {
        issuer: base.into(),
        authorization_endpoint: format!("{base}/auth"),
        token_endpoint: format!("{base}/token"),
        userinfo_endpoint: Some(format!("{base}/userinfo")),
        jwks_uri: None,
        scopes_supported: Vec::new(),
        code_challenge_methods_supported: vec!["S256".into()],
    }
}

pub fn oauth_config(base: &str) -> OAuthConfig {
    OAuthConfig::from_metadata(&oidc_settings(base), &provider_metadata(base))
}
