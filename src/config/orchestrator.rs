//! # Orchestrator Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_ACTIVITY_LOG_TIMEOUT_SECS, DEFAULT_ACTIVITY_LOG_WINDOW_SECS,
    DEFAULT_MAX_CONCURRENT_LOG_STREAMS, DEFAULT_SYSTEM_NAMESPACE,
};
use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// Root folder for every collected artifact
    pub artifacts_folder: PathBuf,
    /// Length of the trailing activity log window (seconds)
    pub activity_log_window_secs: u64,
    /// Wall-clock budget for one activity log traversal (seconds)
    pub activity_log_timeout_secs: u64,
    /// Maximum concurrently streaming pod log tasks, 0 means unbounded
    pub max_concurrent_log_streams: usize,
    /// Open pod log streams in follow mode
    pub follow_pod_logs: bool,
    /// Wait for pod log tasks to finish instead of detaching them
    pub wait_for_pod_logs: bool,
    /// Namespace of the workload cluster whose pods are streamed
    pub system_namespace: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            log_enable_color: false,
            artifacts_folder: PathBuf::from("_artifacts"),
            activity_log_window_secs: DEFAULT_ACTIVITY_LOG_WINDOW_SECS,
            activity_log_timeout_secs: DEFAULT_ACTIVITY_LOG_TIMEOUT_SECS,
            max_concurrent_log_streams: DEFAULT_MAX_CONCURRENT_LOG_STREAMS,
            follow_pod_logs: true,
            wait_for_pod_logs: false,
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            log_enable_color: env_var_or_default_bool("LOG_ENABLE_COLOR", false),
            artifacts_folder: PathBuf::from(env_var_or_default_str(
                "ARTIFACTS_FOLDER",
                "_artifacts",
            )),
            activity_log_window_secs: env_var_or_default(
                "ACTIVITY_LOG_WINDOW_SECS",
                DEFAULT_ACTIVITY_LOG_WINDOW_SECS,
            ),
            activity_log_timeout_secs: env_var_or_default(
                "ACTIVITY_LOG_TIMEOUT_SECS",
                DEFAULT_ACTIVITY_LOG_TIMEOUT_SECS,
            ),
            max_concurrent_log_streams: env_var_or_default(
                "MAX_CONCURRENT_LOG_STREAMS",
                DEFAULT_MAX_CONCURRENT_LOG_STREAMS,
            ),
            follow_pod_logs: env_var_or_default_bool("FOLLOW_POD_LOGS", true),
            wait_for_pod_logs: env_var_or_default_bool("WAIT_FOR_POD_LOGS", false),
            system_namespace: env_var_or_default_str(
                "LOG_SYSTEM_NAMESPACE",
                DEFAULT_SYSTEM_NAMESPACE,
            ),
        }
    }

    pub fn activity_log_window(&self) -> Duration {
        Duration::from_secs(self.activity_log_window_secs)
    }

    pub fn activity_log_timeout(&self) -> Duration {
        Duration::from_secs(self.activity_log_timeout_secs)
    }

    /// One-off collection: streams end with the current log contents and
    /// the caller waits for every file to be written
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            follow_pod_logs: false,
            wait_for_pod_logs: true,
            ..self.clone()
        }
    }

    /// Concurrency cap for pod log tasks, `None` when unbounded
    pub fn log_stream_limit(&self) -> Option<usize> {
        (self.max_concurrent_log_streams > 0).then_some(self.max_concurrent_log_streams)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_waits_without_following() {
        let config = OrchestratorConfig {
            max_concurrent_log_streams: 8,
            ..OrchestratorConfig::default()
        };
        let snapshot = config.snapshot();
        assert!(!snapshot.follow_pod_logs);
        assert!(snapshot.wait_for_pod_logs);
        assert_eq!(snapshot.log_stream_limit(), Some(8));
        assert!(config.follow_pod_logs);
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.activity_log_window(), Duration::from_secs(7200));
        assert_eq!(config.activity_log_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_stream_limit(), Some(64));
        assert_eq!(config.system_namespace, "kube-system");
        assert!(config.follow_pod_logs);
        assert!(!config.wait_for_pod_logs);
    }

    #[test]
    fn test_zero_stream_limit_is_unbounded() {
        let config = OrchestratorConfig {
            max_concurrent_log_streams: 0,
            ..Default::default()
        };
        assert_eq!(config.log_stream_limit(), None);
    }

    #[test]
    fn test_bool_parsing() {
        std::env::set_var("KNARLY_TEST_BOOL_FLAG", "Yes");
        assert!(env_var_or_default_bool("KNARLY_TEST_BOOL_FLAG", false));
        std::env::set_var("KNARLY_TEST_BOOL_FLAG", "off");
        assert!(!env_var_or_default_bool("KNARLY_TEST_BOOL_FLAG", true));
        std::env::remove_var("KNARLY_TEST_BOOL_FLAG");
        assert!(env_var_or_default_bool("KNARLY_TEST_BOOL_FLAG", true));
    }

    #[test]
    fn test_numeric_fallback_on_garbage() {
        std::env::set_var("KNARLY_TEST_NUMERIC", "not-a-number");
        assert_eq!(env_var_or_default("KNARLY_TEST_NUMERIC", 7u64), 7);
        std::env::remove_var("KNARLY_TEST_NUMERIC");
    }
}
