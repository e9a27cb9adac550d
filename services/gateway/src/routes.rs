//! HTTP/JSON routes for the auth RPCs
//!
//! Each handler runs the same pipeline: lift cookies into a fresh
//! [`CallContext`], invoke the RPC, then lower queued cookies into the
//! response. Lowering happens on failure too, so a handler that cleared
//! cookies before failing still clears them in the browser.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use oidc_auth::{AuthService, ExchangeCodeMessage};
use rpc::{CallContext, Code};
use serde::Serialize;
use tracing::{Instrument, Span, info, info_span};

use crate::bridge::{self, CookiePolicy};
use crate::error::Error;
use crate::metrics::{self, RequestCounters};

const BEGIN_AUTH: &str = "BeginAuth";
const EXCHANGE_CODE: &str = "ExchangeCode";
const GET_USER_INFO: &str = "GetUserInfo";
const LOGOUT: &str = "Logout";

/// State shared by the auth handlers.
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
    pub cookies: CookiePolicy,
    pub counters: Arc<RequestCounters>,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/v1/auth/begin", post(begin_auth))
        .route("/v1/auth/exchange", post(exchange_code))
        .route("/v1/auth/userinfo", post(get_user_info))
        .route("/v1/auth/logout", post(logout))
        .with_state(state)
}

/// One in-flight RPC.
struct Call {
    operation: &'static str,
    ctx: CallContext,
    span: Span,
    started: Instant,
}

impl Call {
    fn start(operation: &'static str, headers: &HeaderMap) -> Self {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!("rpc", operation, request_id = %request_id);

        let mut ctx = CallContext::new();
        bridge::lift_cookies(headers, &mut ctx);

        Self {
            operation,
            ctx,
            span,
            started: Instant::now(),
        }
    }

    fn finish<T: Serialize>(mut self, state: &AuthState, result: Result<T, Error>) -> Response {
        let code = result.as_ref().err().map_or(Code::Ok, Error::code);

        let mut response = match result {
            Ok(body) => Json(body).into_response(),
            Err(e) => e.into_response(),
        };
        bridge::lower_cookies(&mut self.ctx, response.headers_mut(), state.cookies);

        let elapsed = self.started.elapsed();
        metrics::record_request(self.operation, code, elapsed.as_secs_f64());
        state.counters.record(code);

        self.span.in_scope(|| {
            info!(
                code = %code,
                status = response.status().as_u16(),
                duration_ms = elapsed.as_millis() as u64,
                "request finished"
            )
        });

        response
    }
}

async fn begin_auth(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let mut call = Call::start(BEGIN_AUTH, &headers);
    let result = state
        .service
        .begin_auth(&mut call.ctx)
        .instrument(call.span.clone())
        .await;
    call.finish(&state, result.map_err(Error::from))
}

async fn exchange_code(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Result<Json<ExchangeCodeMessage>, JsonRejection>,
) -> Response {
    let mut call = Call::start(EXCHANGE_CODE, &headers);
    let result = match body {
        Ok(Json(request)) => state
            .service
            .exchange_code(&mut call.ctx, request)
            .instrument(call.span.clone())
            .await
            .map_err(Error::from),
        Err(rejection) => Err(Error::InvalidBody(rejection.body_text())),
    };
    call.finish(&state, result)
}

async fn get_user_info(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let mut call = Call::start(GET_USER_INFO, &headers);
    let result = state
        .service
        .get_user_info(&mut call.ctx)
        .instrument(call.span.clone())
        .await;
    call.finish(&state, result.map_err(Error::from))
}

async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let mut call = Call::start(LOGOUT, &headers);
    let result = state
        .service
        .logout(&mut call.ctx)
        .instrument(call.span.clone())
        .await;
    call.finish(&state, result.map_err(Error::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use oidc_auth::StaticProvider;
    use oidc_auth::testing::{MockIdp, TEST_ACCESS_TOKEN, oidc_settings, provider_metadata};
    use rpc::Status;
    use tower::ServiceExt;

    fn test_state(provider: StaticProvider, development: bool) -> AuthState {
        AuthState {
            service: Arc::new(AuthService::new(
                Arc::new(provider),
                reqwest::Client::new(),
            )),
            cookies: CookiePolicy::for_mode(development),
            counters: Arc::new(RequestCounters::default()),
        }
    }

    fn state_for(idp_url: &str) -> AuthState {
        test_state(
            StaticProvider::new(oidc_settings(idp_url), provider_metadata(idp_url))
                .with_verifier("V"),
            false,
        )
    }

    fn rpc_request(path: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn begin_returns_url_and_sets_flow_cookies() {
        let state = state_for("http://idp.localhost");
        let response = router(state)
            .oneshot(rpc_request("/v1/auth/begin", None, "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("state=")));
        assert!(cookies.iter().any(|c| c.starts_with("verifier=V;")));
        for cookie in &cookies {
            assert!(cookie.contains("HttpOnly"), "{cookie}");
            assert!(cookie.contains("Secure"), "{cookie}");
        }

        let json = body_json(response).await;
        let url = json["url"].as_str().unwrap();
        assert!(url.starts_with("http://idp.localhost/auth?"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn development_mode_cookies_are_not_secure() {
        let provider = StaticProvider::new(
            oidc_settings("http://idp.localhost"),
            provider_metadata("http://idp.localhost"),
        );
        let response = router(test_state(provider, true))
            .oneshot(rpc_request("/v1/auth/begin", None, "{}"))
            .await
            .unwrap();

        for cookie in set_cookies(&response) {
            assert!(cookie.contains("HttpOnly"), "{cookie}");
            assert!(!cookie.contains("Secure"), "{cookie}");
        }
    }

    #[tokio::test]
    async fn exchange_sets_session_cookies() {
        let idp = MockIdp::start().await;
        let state = state_for(&idp.url);

        let response = router(state)
            .oneshot(rpc_request(
                "/v1/auth/exchange",
                Some("verifier=V; state=S"),
                r#"{"code":"test_code","state":"S"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 4);
        assert!(cookies[0].starts_with("token=test_access_token;"));
        assert!(cookies[1].starts_with("refresh_token=test_refresh_token;"));
        assert!(cookies[2].starts_with("verifier=;"));
        assert!(cookies[3].starts_with("state=;"));
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn exchange_with_wrong_state_is_401_without_cookies() {
        let idp = MockIdp::start().await;
        let state = state_for(&idp.url);

        let response = router(state)
            .oneshot(rpc_request(
                "/v1/auth/exchange",
                Some("verifier=V; state=S"),
                r#"{"code":"test_code","state":"wrong"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(&response).is_empty());
        let json = body_json(response).await;
        assert_eq!(json["code"], 16);
        assert_eq!(json["message"], "state mismatch");
    }

    #[tokio::test]
    async fn exchange_with_invalid_body_is_400() {
        let state = state_for("http://idp.localhost");
        let response = router(state)
            .oneshot(rpc_request(
                "/v1/auth/exchange",
                Some("verifier=V; state=S"),
                r#"{"code":"test_code"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], 3);
    }

    #[tokio::test]
    async fn userinfo_requires_token_cookie() {
        let idp = MockIdp::start().await;
        let app = router(state_for(&idp.url));

        let response = app
            .clone()
            .oneshot(rpc_request("/v1/auth/userinfo", None, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(rpc_request(
                "/v1/auth/userinfo",
                Some(&format!("token={TEST_ACCESS_TOKEN}")),
                "{}",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["subject"], "test_subject");
    }

    #[tokio::test]
    async fn logout_clears_all_session_cookies() {
        let state = state_for("http://idp.localhost");
        let response = router(state)
            .oneshot(rpc_request("/v1/auth/logout", Some("token=AT"), "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let names: Vec<String> = set_cookies(&response)
            .iter()
            .map(|c| {
                let cookie = cookie::Cookie::parse(c.as_str()).unwrap();
                assert_eq!(cookie.value(), "");
                cookie.name().to_owned()
            })
            .collect();
        assert_eq!(names, ["token", "refresh_token", "verifier", "state"]);
    }

    #[tokio::test]
    async fn misconfigured_provider_is_500() {
        let mut incomplete = oidc_settings("http://idp.localhost");
        incomplete.client_id.clear();
        let provider =
            StaticProvider::new(incomplete, provider_metadata("http://idp.localhost"));

        let response = router(test_state(provider, false))
            .oneshot(rpc_request("/v1/auth/begin", None, "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["code"], 13);
        assert_eq!(json["message"], "failed to get OAuth2 config");
    }

    #[tokio::test]
    async fn get_is_not_routed() {
        let state = state_for("http://idp.localhost");
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/v1/auth/begin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn counters_track_outcomes() {
        let state = state_for("http://idp.localhost");
        let counters = state.counters.clone();
        let app = router(state);

        app.clone()
            .oneshot(rpc_request("/v1/auth/logout", None, "{}"))
            .await
            .unwrap();
        app.oneshot(rpc_request("/v1/auth/userinfo", None, "{}"))
            .await
            .unwrap();

        assert_eq!(counters.requests(), 2);
        assert_eq!(counters.errors(), 1);
    }

    #[test]
    fn failed_call_still_emits_queued_cookies() {
        let state = state_for("http://idp.localhost");
        let mut call = Call::start(LOGOUT, &HeaderMap::new());
        call.ctx.set_cookie("token", "").unwrap();

        let response =
            call.finish::<()>(&state, Err(Error::from(Status::internal("downstream failed"))));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(set_cookies(&response).len(), 1);
    }
}
