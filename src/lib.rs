//! # knarly-e2e
//!
//! Lifecycle orchestration for ephemeral Cluster API test environments on
//! Azure.
//!
//! A spec runs in its own namespace on the management cluster
//! ([`namespace::setup_spec_namespace`]). At teardown the
//! [`cleanup::CleanupOrchestrator`] collects pod and activity logs
//! ([`logs`]), dumps the Cluster API objects, deletes the clusters and the
//! namespace, and finally checks that the cluster's resource group is gone.
//!
//! Test bodies are external programs run through [`workload`].

pub mod azure;
pub mod checkpoint;
pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod logs;
pub mod namespace;
pub mod observability;
pub mod workload;

pub use error::{
    ActivityLogError, ExternalToolError, LogStreamError, SetupError, StepFailure, TeardownError,
};
