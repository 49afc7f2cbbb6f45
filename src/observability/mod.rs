//! # Observability
//!
//! Tracing subscriber setup and Prometheus counters.

pub mod logging;
pub mod metrics;
