//! Configuration validation.
//!
//! Serde handles syntactic validation; this module covers the semantic
//! checks. Validation is a pure function over `ProxyConfig` and returns
//! all errors found, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{Origin, ProxyConfig};

/// A single semantic configuration error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}': {1}")]
    InvalidBindAddress(String, String),

    #[error("invalid origin URL '{0}': {1}")]
    InvalidOriginUrl(String, String),

    #[error("origin scheme must be http or https, got '{0}'")]
    UnsupportedOriginScheme(String),

    #[error("origin URL '{0}' must not carry a query string")]
    OriginUrlHasQuery(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("invalid metrics address '{0}': {1}")]
    InvalidMetricsAddress(String, String),

    #[error("listener TLS {0} path is empty")]
    EmptyTlsPath(&'static str),
}

/// Validate the full configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
            e.to_string(),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key"));
        }
    }

    if let Err(e) = Origin::from_config(&config.origin) {
        errors.push(e);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.observability.metrics_enabled {
        if let Err(e) = config.observability.metrics_address.parse::<SocketAddr>() {
            errors.push(ValidationError::InvalidMetricsAddress(
                config.observability.metrics_address.clone(),
                e.to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
