//! Transparent forwarding proxy for a single upstream origin.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │               ORIGIN PROXY                    │
//!                    │                                               │
//!   Client Request   │  ┌─────────┐     ┌───────────┐               │
//!   ─────────────────┼─▶│  http   │────▶│  request  │──── HTTP ─────┼──▶
//!                    │  │ server  │     │ rewriter  │               │    Origin
//!   Client Response  │  └────┬────┘     └───────────┘               │    Server
//!   ◀────────────────┼───────┼──────────┌───────────┐               │
//!                    │       │          │ response  │◀─── HTTP ─────┼──◀
//!                    │       │          │ rewriter  │               │
//!                    │       │          └───────────┘               │
//!                    │       │ Upgrade: websocket                   │
//!                    │       ▼                                      │
//!                    │  ┌───────────┐                               │
//!   WS frames ◀──────┼─▶│ websocket │◀───── WS frames ──────────────┼─▶
//!                    │  │   relay   │                               │
//!                    │  └───────────┘                               │
//!                    │                                               │
//!                    │  ┌─────────────────────────────────────────┐ │
//!                    │  │  config        observability            │ │
//!                    │  └─────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! The proxy is stateless per request: the only process-wide state is
//! the immutable, startup-validated origin configuration.

pub mod config;
pub mod http;
pub mod observability;

pub use config::{Origin, ProxyConfig};
pub use http::HttpServer;
