//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; request ID on every log line
//! - Metrics are cheap (atomic increments), exporter is opt-in

pub mod logging;
pub mod metrics;
