//! # E2E Configuration
//!
//! The YAML file shared by every spec: template variables and the
//! wait/poll intervals keyed by spec and step.
//!
//! ```yaml
//! variables:
//!   REDACT_LOG_SCRIPT: ./scripts/redact.sh
//!   AKS_KUBERNETES_VERSION: v1.30.2
//! intervals:
//!   default/wait-delete-cluster: ["30m", "10s"]
//!   create-workload-cluster/wait-delete-cluster: ["45m", "15s"]
//! ```

use super::duration::parse_kubernetes_duration;
use crate::constants::{DEFAULT_INTERVAL_POLL_SECS, DEFAULT_INTERVAL_TIMEOUT_SECS};
use crate::error::SetupError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Wait bounds for one step: overall timeout and poll period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_INTERVAL_TIMEOUT_SECS),
            poll: Duration::from_secs(DEFAULT_INTERVAL_POLL_SECS),
        }
    }
}

/// Resolves wait bounds for a (spec, step) pair
pub trait IntervalsGetter: Send + Sync {
    fn intervals(&self, spec: &str, step: &str) -> Intervals;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct E2eConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub intervals: BTreeMap<String, Vec<String>>,
}

impl E2eConfig {
    /// Load and parse an e2e configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read e2e config {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse e2e config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        for (key, values) in &config.intervals {
            parse_intervals(values).with_context(|| format!("Invalid intervals for '{key}'"))?;
        }
        Ok(config)
    }

    /// Look up a variable that the spec cannot run without
    pub fn get_variable(&self, name: &str) -> Result<&str, SetupError> {
        self.variables
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SetupError::MissingVariable(name.to_string()))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

impl IntervalsGetter for E2eConfig {
    /// Spec-specific intervals win over `default/<step>`, which wins over the
    /// built-in fallback
    fn intervals(&self, spec: &str, step: &str) -> Intervals {
        let keys = [format!("{spec}/{step}"), format!("default/{step}")];
        for key in &keys {
            if let Some(values) = self.intervals.get(key) {
                match parse_intervals(values) {
                    Ok(intervals) => return intervals,
                    Err(e) => warn!("Ignoring invalid intervals for '{}': {}", key, e),
                }
            }
        }
        Intervals::default()
    }
}

fn parse_intervals(values: &[String]) -> Result<Intervals> {
    let defaults = Intervals::default();
    let timeout = match values.first() {
        Some(v) => parse_kubernetes_duration(v)?,
        None => defaults.timeout,
    };
    let poll = match values.get(1) {
        Some(v) => parse_kubernetes_duration(v)?,
        None => defaults.poll,
    };
    Ok(Intervals { timeout, poll })
}
