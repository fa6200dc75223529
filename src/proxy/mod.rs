//! Dynamic-target forward proxy.
//!
//! `GET /http_proxy?url=<encoded>` and `GET /https_proxy?url=<encoded>`
//! relay any method, headers and body to the decoded `url`. Every other
//! path is served from a static directory.

mod forward;

pub use forward::{forwarded_headers, target_from_query, upstream_error};

use crate::proxify::ProxyRoute;
use crate::{Error, Result};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

/// Largest request body relayed upstream unless configured otherwise
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// TLS relaxation applied to upstream connections of the HTTPS route.
///
/// Map servers with self-signed or expired certificates stay
/// reachable because certificate validation is skipped by default. This
/// weakens upstream authentication; use [`LegacyTls::strict`] where that
/// matters.
///
/// Certificate acceptance is the only toggle. Upstreams go through rustls,
/// which speaks TLS 1.2 and 1.3 only and never renegotiates, so there is no
/// renegotiation or protocol-floor setting to relax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyTls {
    pub accept_invalid_certs: bool,
}

impl Default for LegacyTls {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }
}

impl LegacyTls {
    /// Verify upstream certificates against the bundled web roots
    pub fn strict() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Directory served for every non-proxy path
    pub static_root: PathBuf,
    pub timeout_ms: u64,
    /// Request bodies above this size are answered with 413
    pub max_body_bytes: usize,
    pub legacy_tls: LegacyTls,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_root: PathBuf::from("dist"),
            timeout_ms: 30000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            legacy_tls: LegacyTls::default(),
        }
    }
}

impl ProxyConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream clients, one per route
#[derive(Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    https: reqwest::Client,
    max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        // the plain route may still be handed an https target; it never validates
        let http = upstream_client(timeout, LegacyTls::default())?;
        let https = upstream_client(timeout, config.legacy_tls)?;
        Ok(Self {
            http,
            https,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn client(&self, route: ProxyRoute) -> &reqwest::Client {
        match route {
            ProxyRoute::Http => &self.http,
            ProxyRoute::Https => &self.https,
        }
    }
}

fn upstream_client(timeout: Duration, tls: LegacyTls) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(tls.accept_invalid_certs)
        .build()
        .map_err(|e| Error::ConfigError(format!("Failed to build upstream client: {}", e)))
}

pub fn build_router(state: ProxyState, static_root: &Path) -> Router {
    Router::new()
        .route("/http_proxy", any(http_proxy))
        .route("/http_proxy/{*rest}", any(http_proxy))
        .route("/https_proxy", any(https_proxy))
        .route("/https_proxy/{*rest}", any(https_proxy))
        .fallback_service(ServeDir::new(static_root))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

/// Serve the proxy on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, config: &ProxyConfig) -> Result<()> {
    let state = ProxyState::new(config)?;
    let app = build_router(state, &config.static_root);
    if let Ok(addr) = listener.local_addr() {
        log::info!("proxy listening on {}", addr);
    }
    axum::serve(listener, app).await?;
    Ok(())
}

async fn log_request_response(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    log::debug!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    log::info!("request result: {} for {} {}", response.status(), method, path);
    response
}

async fn http_proxy(State(state): State<ProxyState>, req: Request) -> Response {
    forward::forward(state.client(ProxyRoute::Http), req, state.max_body_bytes)
        .await
        .into_response()
}

async fn https_proxy(State(state): State<ProxyState>, req: Request) -> Response {
    forward::forward(state.client(ProxyRoute::Https), req, state.max_body_bytes)
        .await
        .into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::ProxyUpstream { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Error::MissingParameter(_) | Error::Parse(_) => StatusCode::BAD_REQUEST,
            Error::RequestBody(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::warn!("proxy error {}: {}", status, self);
        (status, self.to_string()).into_response()
    }
}
