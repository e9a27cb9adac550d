//! dig-inv gateway
//!
//! Exposes the OpenID Connect login RPCs to browsers over HTTP/JSON:
//! 1. Loads config from an optional TOML file plus environment
//! 2. Resolves the identity provider through discovery on each call
//! 3. Carries session state in HTTP-only cookies, nothing server-side

mod bridge;
mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use oidc_auth::{AuthService, DiscoveryProvider, OidcContextProvider};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bridge::CookiePolicy;
use crate::config::{Config, ServerConfig};
use crate::metrics::RequestCounters;
use crate::routes::AuthState;

/// Time allowed for in-flight requests to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state of the operational endpoints
#[derive(Clone)]
struct AppState {
    counters: Arc<RequestCounters>,
    started_at: Instant,
    oidc_configured: bool,
    prometheus: PrometheusHandle,
}

fn build_router(
    state: AppState,
    auth: AuthState,
    cors: CorsLayer,
    max_connections: usize,
) -> Router {
    let ops: Router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    ops.merge(routes::router(auth))
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

/// Development mode lets the configured frontend origin send cookies.
/// Otherwise any origin may call, without credentials.
fn build_cors(server: &ServerConfig) -> Result<CorsLayer> {
    let methods = [Method::GET, Method::POST, Method::HEAD];
    let headers = [
        ACCEPT,
        CONTENT_TYPE,
        HeaderName::from_static("x-requested-with"),
    ];

    if !server.development {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers));
    }

    let origin = HeaderValue::from_str(&server.dev_cors_origin)
        .with_context(|| format!("invalid dev_cors_origin {:?}", server.dev_cors_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(methods)
        .allow_headers(headers))
}

fn init_tracing(development: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if development {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config from environment".to_string(),
    })?;

    init_tracing(config.server.development);
    info!("starting dig-inv-gateway");

    let prometheus_handle = metrics::install_recorder();

    let listen_addr = config.server.socket_addr()?;
    info!(
        listen_addr = %listen_addr,
        config_file = ?config_path,
        development = config.server.development,
        issuer = %config.oidc.issuer_url,
        discovery_cache_ttl_secs = config.oidc.discovery_cache_ttl_secs,
        "configuration loaded"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.provider_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let provider = DiscoveryProvider::new(config.oidc.settings(), http_client.clone())
        .with_cache_ttl(Duration::from_secs(config.oidc.discovery_cache_ttl_secs));

    let oidc_configured = match provider.settings().validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "OIDC settings incomplete, auth requests will fail until configured");
            false
        }
    };

    let provider: Arc<dyn OidcContextProvider> = Arc::new(provider);
    let counters = Arc::new(RequestCounters::default());

    let auth = AuthState {
        service: Arc::new(AuthService::new(provider, http_client)),
        cookies: CookiePolicy::for_mode(config.server.development),
        counters: counters.clone(),
    };
    let app_state = AppState {
        counters,
        started_at: Instant::now(),
        oidc_configured,
        prometheus: prometheus_handle,
    };

    let cors = build_cors(&config.server)?;
    let app = build_router(app_state, auth, cors, config.server.max_connections);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts when the signal arrives, not at startup.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus request totals. Always 200; `oidc_configured` is false when
/// required OIDC settings were empty at startup.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "oidc_configured": state.oidc_configured,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "requests_served": state.counters.requests(),
        "errors_total": state.counters.errors(),
    }))
}

/// Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use oidc_auth::StaticProvider;
    use oidc_auth::testing::{oidc_settings, provider_metadata};
    use tower::ServiceExt;

    /// Handle backed by a recorder that is never installed globally.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    fn test_app(development: bool) -> Router {
        let counters = Arc::new(RequestCounters::default());
        let auth = AuthState {
            service: Arc::new(AuthService::new(
                Arc::new(StaticProvider::new(
                    oidc_settings("http://idp.localhost"),
                    provider_metadata("http://idp.localhost"),
                )),
                reqwest::Client::new(),
            )),
            cookies: CookiePolicy::for_mode(development),
            counters: counters.clone(),
        };
        let state = AppState {
            counters,
            started_at: Instant::now(),
            oidc_configured: true,
            prometheus: test_prometheus_handle(),
        };
        let server = ServerConfig {
            development,
            ..ServerConfig::default()
        };

        build_router(state, auth, build_cors(&server).unwrap(), 1000)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/v1/auth/begin")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_json() {
        let app = test_app(false);

        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["oidc_configured"], true);
        assert_eq!(json["requests_served"], 1);
        assert_eq!(json["errors_total"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let response = test_app(false)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn production_cors_allows_any_origin_without_credentials() {
        let response = test_app(false)
            .oneshot(preflight("https://inv.example.com"))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    }

    #[tokio::test]
    async fn development_cors_allows_frontend_with_credentials() {
        let response = test_app(true)
            .oneshot(preflight("http://localhost:5173"))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn development_cors_rejects_other_origins() {
        let response = test_app(true)
            .oneshot(preflight("https://evil.example.com"))
            .await
            .unwrap();

        // The configured origin is always echoed; the browser rejects the mismatch.
        let allowed = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
        assert_ne!(
            allowed.and_then(|v| v.to_str().ok()),
            Some("https://evil.example.com")
        );
        assert_eq!(allowed.unwrap(), "http://localhost:5173");
    }

    #[test]
    fn invalid_dev_origin_is_startup_error() {
        let server = ServerConfig {
            development: true,
            dev_cors_origin: "http://bad\norigin".into(),
            ..ServerConfig::default()
        };
        assert!(build_cors(&server).is_err());
    }
}
