//! Request rewriting for the origin leg.
//!
//! # Responsibilities
//! - Compose the outbound path from the origin base path and inbound path
//! - Copy the query string verbatim (never merged with an origin query)
//! - Overwrite `Host` with the origin hostname
//! - Strip edge/CDN-injected diagnostic headers before forwarding
//! - Inject X-Forwarded-For / X-Forwarded-Host / X-Forwarded-Proto
//!
//! # Design Decisions
//! - Every transform here is a pure function over owned/borrowed header
//!   maps, so the rewrite rules are unit-testable without a live socket
//! - The strip-list is const data, not ad hoc conditionals; adding or
//!   removing a header is a one-line change

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderValue, Uri};

use crate::config::Origin;

/// Edge-injected diagnostic headers that must never reach the origin.
pub const STRIPPED_REQUEST_HEADERS: [&str; 7] = [
    "cf-connecting-ip",
    "cf-ipcountry",
    "cf-ray",
    "cf-visitor",
    "cf-worker",
    "cdn-loop",
    "x-real-ip",
];

/// Compose the outbound path from the origin base path and the inbound path.
///
/// A base path of `/` leaves the inbound path untouched (including `/`
/// itself). Any other base path has no trailing slash by config invariant
/// and is prefixed to the inbound path, which gets a leading slash if it
/// lacks one.
pub fn rewrite_path(base_path: &str, inbound_path: &str) -> String {
    if base_path == "/" {
        return inbound_path.to_string();
    }
    if inbound_path.starts_with('/') {
        format!("{base_path}{inbound_path}")
    } else {
        format!("{base_path}/{inbound_path}")
    }
}

/// Build the outbound request URI for the plain HTTP path.
///
/// The query string is copied byte-for-byte from the inbound request.
pub fn origin_uri(origin: &Origin, inbound: &Uri) -> Result<Uri, axum::http::Error> {
    let path = rewrite_path(&origin.base_path, inbound.path());
    let path_and_query = match inbound.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };

    Uri::builder()
        .scheme(origin.scheme.as_str())
        .authority(origin.authority.as_str())
        .path_and_query(path_and_query)
        .build()
}

/// Produce the outbound header map for the plain HTTP path.
///
/// `inbound_scheme` is the scheme the client used to reach the proxy.
/// This proxy is the edge: a client-supplied `X-Forwarded-Proto` is
/// never trusted and is always overwritten.
pub fn forward_headers(
    inbound: &HeaderMap,
    origin: &Origin,
    client_ip: Option<IpAddr>,
    inbound_scheme: &str,
) -> HeaderMap {
    let mut headers = inbound.clone();

    for name in STRIPPED_REQUEST_HEADERS {
        headers.remove(name);
    }

    // The origin must see itself as the request target; the original
    // host travels in X-Forwarded-Host instead.
    let original_host = inbound.get(header::HOST).cloned();
    if let Ok(host) = HeaderValue::from_str(&origin.host) {
        headers.insert(header::HOST, host);
    }
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }

    if let Ok(proto) = HeaderValue::from_str(inbound_scheme) {
        headers.insert("x-forwarded-proto", proto);
    }

    if let Some(ip) = client_ip {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert("x-forwarded-for", value);
        }
    }

    headers
}
