//! Moves cookies between HTTP headers and the RPC call context
//!
//! Inbound `Cookie` headers are lifted into the context before the handler
//! runs. Cookies the handler queued are lowered into `Set-Cookie` headers
//! afterwards, whether or not the handler succeeded.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use cookie::Cookie;
use rpc::CallContext;
use tracing::warn;

/// Attributes applied to every emitted cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    /// `Secure` everywhere except development mode, where the frontend is
    /// served over plain HTTP.
    pub fn for_mode(development: bool) -> Self {
        Self {
            secure: !development,
        }
    }
}

/// Store the request's cookies on `ctx`. A request without a `Cookie`
/// header leaves the context empty.
pub fn lift_cookies(headers: &HeaderMap, ctx: &mut CallContext) {
    let values = headers.get_all(COOKIE).iter().filter_map(|value| {
        value
            .to_str()
            .inspect_err(|_| warn!("ignoring non-ASCII cookie header"))
            .ok()
    });
    ctx.lift_cookie_headers(values);
}

/// Emit every queued cookie as `Set-Cookie` and drain the queue.
pub fn lower_cookies(ctx: &mut CallContext, headers: &mut HeaderMap, policy: CookiePolicy) {
    for (name, value) in ctx.take_set_cookies() {
        let cookie = Cookie::build((name, value))
            .http_only(true)
            .secure(policy.secure)
            .path("/")
            .build();

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(header) => {
                headers.append(SET_COOKIE, header);
            }
            Err(_) => warn!(cookie = cookie.name(), "dropping cookie with invalid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn lift_reads_all_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("verifier=V; state=S"));
        headers.append(COOKIE, HeaderValue::from_static("token=AT"));

        let mut ctx = CallContext::new();
        lift_cookies(&headers, &mut ctx);

        assert_eq!(ctx.cookie("verifier").unwrap(), "V");
        assert_eq!(ctx.cookie("state").unwrap(), "S");
        assert_eq!(ctx.cookie("token").unwrap(), "AT");
    }

    #[test]
    fn lift_without_cookie_header_is_noop() {
        let mut ctx = CallContext::new();
        lift_cookies(&HeaderMap::new(), &mut ctx);
        assert!(ctx.incoming().is_empty());
    }

    #[test]
    fn lift_is_idempotent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("token=AT"));

        let mut ctx = CallContext::new();
        lift_cookies(&headers, &mut ctx);
        lift_cookies(&headers, &mut ctx);

        assert_eq!(ctx.incoming().len(), 1);
        assert_eq!(ctx.cookie("token").unwrap(), "AT");
    }

    #[test]
    fn malformed_header_yields_not_found_for_its_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("garbage without separator"));
        headers.append(COOKIE, HeaderValue::from_static("token=AT"));

        let mut ctx = CallContext::new();
        lift_cookies(&headers, &mut ctx);

        assert_eq!(ctx.cookie("token").unwrap(), "AT");
        assert_eq!(ctx.cookie("garbage").unwrap_err().code(), rpc::Code::NotFound);
    }

    #[test]
    fn unrelated_bad_cookie_keeps_session_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static(r#"_ga=GA1.2; prefs={"theme":"dark"}; token=AT; state=S"#),
        );

        let mut ctx = CallContext::new();
        lift_cookies(&headers, &mut ctx);

        assert_eq!(ctx.cookie("token").unwrap(), "AT");
        assert_eq!(ctx.cookie("state").unwrap(), "S");
        assert_eq!(ctx.cookie("_ga").unwrap(), "GA1.2");
        assert_eq!(ctx.cookie("prefs").unwrap_err().code(), rpc::Code::NotFound);
    }

    #[test]
    fn lower_sets_http_only_and_secure_in_production() {
        let mut ctx = CallContext::new();
        ctx.set_cookie("token", "AT").unwrap();

        let mut headers = HeaderMap::new();
        lower_cookies(&mut ctx, &mut headers, CookiePolicy::for_mode(false));

        let emitted = set_cookies(&headers);
        assert_eq!(emitted.len(), 1);
        let cookie = Cookie::parse(emitted[0].as_str()).unwrap();
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.value(), "AT");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn lower_omits_secure_in_development() {
        let mut ctx = CallContext::new();
        ctx.set_cookie("state", "S").unwrap();

        let mut headers = HeaderMap::new();
        lower_cookies(&mut ctx, &mut headers, CookiePolicy::for_mode(true));

        let emitted = set_cookies(&headers);
        assert!(emitted[0].contains("HttpOnly"));
        assert!(!emitted[0].contains("Secure"));
    }

    #[test]
    fn lower_emits_cleared_cookies_and_drains_queue() {
        let mut ctx = CallContext::new();
        ctx.set_cookies(&[("verifier", ""), ("state", "")]).unwrap();

        let mut headers = HeaderMap::new();
        lower_cookies(&mut ctx, &mut headers, CookiePolicy::for_mode(false));
        lower_cookies(&mut ctx, &mut headers, CookiePolicy::for_mode(false));

        let emitted = set_cookies(&headers);
        assert_eq!(emitted.len(), 2);
        assert!(emitted[0].starts_with("verifier=;"));
        assert!(emitted[1].starts_with("state=;"));
    }

    #[test]
    fn lower_on_detached_context_emits_nothing() {
        let mut ctx = CallContext::detached();
        let mut headers = HeaderMap::new();
        lower_cookies(&mut ctx, &mut headers, CookiePolicy::for_mode(false));
        assert!(headers.is_empty());
    }
}
