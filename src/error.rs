//! # Errors
//!
//! Error taxonomy for the orchestrator.
//!
//! - [`SetupError`] aborts a spec before its body runs.
//! - [`LogStreamError`] and [`ActivityLogError`] describe diagnostic collection
//!   failures. They are logged and never fail a spec.
//! - [`TeardownError`] aggregates the hard failures of one cleanup run.
//! - [`ExternalToolError`] carries the full output of a failed subprocess.

use crate::cleanup::CleanupStep;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to look up namespace {name}: {source}")]
    NamespaceLookup {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to create namespace {name}: {source}")]
    NamespaceCreate {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to create secret {namespace}/{name}: {source}")]
    SecretCreate {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("e2e config variable {0} is not set")]
    MissingVariable(String),
}

#[derive(Debug, Error)]
pub enum LogStreamError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start log stream: {0}")]
    OpenStream(#[source] anyhow::Error),
    #[error("error while streaming logs: {0}")]
    Stream(#[source] std::io::Error),
    #[error("log task panicked: {0}")]
    Panicked(String),
}

impl LogStreamError {
    /// Local filesystem failures have no recoverable alternative
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::CreateDir { .. } | Self::OpenFile { .. })
    }
}

#[derive(Debug, Error)]
pub enum ActivityLogError {
    #[error("failed to query activity logs: {0}")]
    Query(#[source] anyhow::Error),
    #[error("failed to fetch next activity log page: {0}")]
    Page(#[source] anyhow::Error),
    #[error("activity log traversal exceeded {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to prepare activity log file {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One failed step of a cleanup run
#[derive(Debug)]
pub struct StepFailure {
    pub step: CleanupStep,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("teardown of spec {spec} failed: {}", format_failures(failures))]
    StepsFailed {
        spec: String,
        failures: Vec<StepFailure>,
    },
}

impl TeardownError {
    #[must_use]
    pub fn failures(&self) -> &[StepFailure] {
        match self {
            Self::StepsFailed { failures, .. } => failures,
        }
    }

    /// True when the leak gate is among the failed steps
    #[must_use]
    pub fn is_leak(&self) -> bool {
        self.failures()
            .iter()
            .any(|f| f.step == CleanupStep::VerifyNoLeakedResources)
    }
}

fn format_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.step.as_str(), f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ExternalToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}\n{output}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },
}
