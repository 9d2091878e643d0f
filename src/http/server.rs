//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all proxy handler
//! - Wire up middleware (tracing, request timeout)
//! - Route each inbound request: `Upgrade: websocket` goes to the relay,
//!   everything else takes the plain HTTP path
//! - Forward plain requests to the origin through a shared client
//! - Synthesize 502 when the origin is unreachable

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::{ConfigError, Origin, ProxyConfig};
use crate::http::{request, response, websocket};
use crate::observability::metrics;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    /// The one fixed upstream origin, normalized at startup.
    pub origin: Arc<Origin>,

    /// Shared outbound client. The legacy client never follows
    /// redirects, so the origin's redirects reach the client untouched.
    pub client: Client<HttpsConnector<HttpConnector>, Body>,

    /// Scheme clients use to reach this proxy, for X-Forwarded-Proto.
    pub inbound_scheme: &'static str,
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new server with the given configuration.
    ///
    /// Fails when the origin URL does not normalize; that is a fatal
    /// startup condition, never retried per request.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let origin = Origin::from_config(&config.origin)
            .map_err(|e| ConfigError::Validation(vec![e]))?;

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        let state = AppState {
            origin: Arc::new(origin),
            client,
            inbound_scheme: if config.listener.tls.is_some() {
                "https"
            } else {
                "http"
            },
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// A clone of the router, for serving over a TLS listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main dispatch handler.
///
/// Routing is purely on the `Upgrade` header: exactly the value
/// `websocket` (case-insensitive) goes to the relay, everything else is
/// forwarded over plain HTTP.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if is_websocket_upgrade(request.headers()) {
        let (mut parts, _body) = request.into_parts();
        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => {
                tracing::warn!(
                    request_id = %request_id,
                    path = %parts.uri.path(),
                    "Malformed WebSocket upgrade request"
                );
                return rejection.into_response();
            }
        };
        return websocket::handle_upgrade(ws, &state.origin, &parts.headers, &parts.uri, request_id)
            .await;
    }

    forward_http(state, addr, request, request_id, start).await
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Plain HTTP path: rewrite the request, call the origin once, rewrite
/// the response. No retries anywhere.
async fn forward_http(
    state: AppState,
    addr: SocketAddr,
    request: Request<Body>,
    request_id: String,
    start: Instant,
) -> Response {
    let request_origin = request.headers().get(header::ORIGIN).cloned();
    let method = request.method().clone();
    let method_str = method.to_string();

    // Preflight is answered here; the OPTIONS call never reaches the origin.
    if method == Method::OPTIONS {
        tracing::debug!(request_id = %request_id, "CORS preflight intercepted");
        metrics::record_request(&method_str, 204, start);
        return response::preflight_response(request_origin.as_ref());
    }

    let target = match request::origin_uri(&state.origin, request.uri()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to build origin URI");
            metrics::record_request(&method_str, 400, start);
            return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        target = %target,
        "Proxying request"
    );

    let (parts, body) = request.into_parts();
    let mut headers = request::forward_headers(
        &parts.headers,
        &state.origin,
        Some(addr.ip()),
        state.inbound_scheme,
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }

    // GET and HEAD never carry a body to the origin, whatever the client sent.
    let outbound_body = if method == Method::GET || method == Method::HEAD {
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        Body::empty()
    } else {
        body
    };

    let mut outbound = Request::new(outbound_body);
    *outbound.method_mut() = method;
    *outbound.uri_mut() = target;
    *outbound.headers_mut() = headers;

    match state.client.request(outbound).await {
        Ok(origin_response) => {
            let status = origin_response.status();
            tracing::debug!(request_id = %request_id, status = %status, "Origin responded");
            metrics::record_request(&method_str, status.as_u16(), start);
            response::rewrite_response(origin_response, request_origin.as_ref())
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Origin unreachable");
            metrics::record_request(&method_str, 502, start);
            response::bad_gateway(&e.to_string())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
