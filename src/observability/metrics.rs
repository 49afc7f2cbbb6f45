//! # Metrics
//!
//! Prometheus counters describing one orchestrator run.
//!
//! ## Metrics Exposed
//!
//! - `knarly_e2e_pod_log_streams_total{outcome}` - Pod log tasks by outcome
//! - `knarly_e2e_activity_log_events_total{disposition}` - Activity log events by disposition
//! - `knarly_e2e_cleanup_step_failures_total{step}` - Failed cleanup steps
//! - `knarly_e2e_leak_checks_total{result}` - Resource group leak checks by result

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static POD_LOG_STREAMS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "knarly_e2e_pod_log_streams_total",
            "Pod log streaming tasks by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create POD_LOG_STREAMS_TOTAL metric - this should never happen")
});

static ACTIVITY_LOG_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "knarly_e2e_activity_log_events_total",
            "Activity log events by disposition",
        ),
        &["disposition"],
    )
    .expect("Failed to create ACTIVITY_LOG_EVENTS_TOTAL metric - this should never happen")
});

static CLEANUP_STEP_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "knarly_e2e_cleanup_step_failures_total",
            "Cleanup steps that failed",
        ),
        &["step"],
    )
    .expect("Failed to create CLEANUP_STEP_FAILURES_TOTAL metric - this should never happen")
});

static LEAK_CHECKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "knarly_e2e_leak_checks_total",
            "Resource group leak checks by result",
        ),
        &["result"],
    )
    .expect("Failed to create LEAK_CHECKS_TOTAL metric - this should never happen")
});

/// Register all counters with the crate registry
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(POD_LOG_STREAMS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIVITY_LOG_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLEANUP_STEP_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LEAK_CHECKS_TOTAL.clone()))?;
    Ok(())
}

pub fn record_pod_log_stream(outcome: &str) {
    POD_LOG_STREAMS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_activity_log_event(disposition: &str) {
    ACTIVITY_LOG_EVENTS_TOTAL
        .with_label_values(&[disposition])
        .inc();
}

pub fn record_cleanup_step_failure(step: &str) {
    CLEANUP_STEP_FAILURES_TOTAL.with_label_values(&[step]).inc();
}

pub fn record_leak_check(result: &str) {
    LEAK_CHECKS_TOTAL.with_label_values(&[result]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
