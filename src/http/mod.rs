//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound connection
//!     → server.rs (Axum setup, Upgrade-header dispatch)
//!     → request.rs (path/header rewrite for the origin leg)
//!     → [outbound call to the origin]
//!     → response.rs (CORS, security headers, redirect handling)
//!     → send to client
//!
//! Upgrade: websocket
//!     → websocket.rs (origin dial, bidirectional frame relay)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use server::HttpServer;
