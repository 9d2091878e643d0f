//! Response rewriting for the client leg.
//!
//! # Responsibilities
//! - Apply the CORS policy (echo inbound Origin or wildcard)
//! - Short-circuit OPTIONS preflight with 204
//! - Pass redirects through untouched except for the header set
//! - Add security headers only where the origin did not
//! - Stream non-redirect bodies through without buffering
//! - Synthesize 502 when the origin is unreachable
//!
//! # Design Decisions
//! - `Access-Control-Allow-Credentials: true` and a wildcard allow-origin
//!   are mutually exclusive; the Origin-present branch is authoritative
//! - The proxy never follows redirects on the client's behalf

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};

/// Methods this proxy forwards, advertised on every response.
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH, HEAD";

/// Request headers a browser may send through this proxy.
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, Range, Accept, Origin, \
     X-Requested-With, Sec-WebSocket-Protocol, Sec-WebSocket-Extensions, \
     Sec-WebSocket-Key, Sec-WebSocket-Version";

/// Response headers exposed to browser scripts.
pub const CORS_EXPOSE_HEADERS: &str =
    "Content-Length, Content-Range, Date, ETag, Vary, WWW-Authenticate";

/// Apply the CORS header policy in place.
///
/// When the inbound request carried an `Origin` header its exact value is
/// echoed and credentials are allowed; otherwise the wildcard is used and
/// credentials are not.
pub fn apply_cors(headers: &mut HeaderMap, request_origin: Option<&HeaderValue>) {
    match request_origin {
        Some(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        None => {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
            headers.remove(header::ACCESS_CONTROL_ALLOW_CREDENTIALS);
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(CORS_EXPOSE_HEADERS),
    );
}

/// Rewrite an origin response into the client-facing response.
///
/// Redirects (300–399 with `Location`) keep their status and rewritten
/// headers but carry no body. Everything else streams the origin body
/// through unmodified.
pub fn rewrite_response<B>(
    origin_response: Response<B>,
    request_origin: Option<&HeaderValue>,
) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (mut parts, body) = origin_response.into_parts();

    apply_cors(&mut parts.headers, request_origin);

    if parts.status.is_redirection() && parts.headers.contains_key(header::LOCATION) {
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.remove(header::TRANSFER_ENCODING);
        return Response::from_parts(parts, Body::empty());
    }

    if !parts.headers.contains_key(header::X_CONTENT_TYPE_OPTIONS) {
        parts.headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
    }
    if !parts.headers.contains_key(header::X_FRAME_OPTIONS) {
        parts
            .headers
            .insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    }
    parts.headers.remove("x-powered-by");

    Response::from_parts(parts, Body::new(body))
}

/// Response for an intercepted OPTIONS preflight: 204, CORS headers only.
pub fn preflight_response(request_origin: Option<&HeaderValue>) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(response.headers_mut(), request_origin);
    response
}

/// Synthesized response for an unreachable origin.
pub fn bad_gateway(detail: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!(
        "Proxy error to target service: {detail}"
    )));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
