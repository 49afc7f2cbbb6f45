//! # Logging
//!
//! Installs the global tracing subscriber.

use crate::config::OrchestratorConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Configure rustls with the ring provider
///
/// Must run before any Kubernetes or Azure client is created. Calling it
/// more than once is harmless.
pub fn init_rustls() {
    // An Err here means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. A second call returns an
/// error from the subscriber registry, which callers may ignore.
pub fn init_tracing(config: &OrchestratorConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "knarly_e2e={},kube=warn",
            config.log_level.to_lowercase()
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_ansi(config.log_enable_color).try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}
