//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::validation::ValidationError;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single upstream origin all traffic is forwarded to.
    pub origin: OriginConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream origin configuration as written in the config file.
///
/// The raw URL is normalized into [`Origin`] exactly once at startup;
/// a malformed value is a fatal startup error, never a per-request one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the origin (e.g., "https://backend.example/api/v1").
    pub url: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout in seconds. Applies to the plain HTTP path;
    /// established WebSocket sessions are never timed out by the proxy.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter.
    pub metrics_enabled: bool,

    /// Address for the metrics scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Validated, normalized origin endpoint.
///
/// Invariant: `base_path` starts with `/` and has no trailing slash
/// unless it is exactly `/`.
#[derive(Debug, Clone)]
pub struct Origin {
    /// "http" or "https".
    pub scheme: String,

    /// Hostname only, used for the overwritten `Host` header.
    pub host: String,

    /// `host` or `host:port` when the URL carries an explicit port.
    pub authority: String,

    /// Base path prefixed to every inbound path.
    pub base_path: String,
}

impl Origin {
    /// Parse and normalize the configured origin URL.
    pub fn from_config(config: &OriginConfig) -> Result<Self, ValidationError> {
        let parsed = Url::parse(&config.url)
            .map_err(|e| ValidationError::InvalidOriginUrl(config.url.clone(), e.to_string()))?;

        let scheme = parsed.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(ValidationError::UnsupportedOriginScheme(scheme));
        }
        if parsed.query().is_some() {
            return Err(ValidationError::OriginUrlHasQuery(config.url.clone()));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| {
                ValidationError::InvalidOriginUrl(config.url.clone(), "missing host".to_string())
            })?
            .to_string();

        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };

        let mut base_path = parsed.path().to_string();
        while base_path.len() > 1 && base_path.ends_with('/') {
            base_path.pop();
        }
        if base_path.is_empty() {
            base_path.push('/');
        }

        Ok(Self {
            scheme,
            host,
            authority,
            base_path,
        })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// Scheme used when dialing the origin for a WebSocket upgrade.
    pub fn ws_scheme(&self) -> &'static str {
        if self.is_https() {
            "wss"
        } else {
            "ws"
        }
    }
}
