//! # Cluster Access
//!
//! The cluster API surface the orchestrator needs, expressed as two traits:
//!
//! - [`ClusterProxy`]: the management (bootstrap) cluster hosting the spec
//!   namespace and the Cluster API objects
//! - [`WorkloadCluster`]: the cluster under test, used for pod log streaming
//!
//! [`KubeClusterProxy`] implements both on top of kube-rs. Tests substitute
//! in-memory fakes.

mod kube_proxy;
mod resources;

pub use kube_proxy::{KubeClusterProxy, KubeWorkloadCluster};
pub use resources::resource_file_path;

use crate::config::Intervals;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Event, Namespace, Pod, Secret};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Raw container log bytes
pub type LogStream = Pin<Box<dyn futures::io::AsyncBufRead + Send>>;

/// Events observed in one namespace, in arrival order
pub type EventStream = BoxStream<'static, Result<Event>>;

/// Handle to a provisioned workload cluster (its Cluster object)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRef {
    pub namespace: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogStreamOptions {
    /// Keep the stream open and deliver new lines as the container writes them
    pub follow: bool,
}

/// Management cluster operations used by setup and teardown
#[async_trait]
pub trait ClusterProxy: Send + Sync {
    /// Name used for the cluster's artifact folder
    fn name(&self) -> &str;

    /// `Ok(None)` when the namespace does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn create_namespace(&self, name: &str) -> Result<Namespace>;

    /// Open a stream of events for a namespace
    fn watch_namespace_events(&self, namespace: &str) -> EventStream;

    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Look up a workload cluster by name, `Ok(None)` when absent
    async fn find_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterRef>>;

    /// Serialize every Cluster API object in `namespace` below `log_path`
    async fn dump_all_resources(&self, namespace: &str, log_path: &Path) -> Result<()>;

    /// Delete every workload cluster in `namespace` and wait until they are gone
    async fn delete_all_clusters_and_wait(
        &self,
        namespace: &str,
        intervals: &Intervals,
    ) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Client for the workload cluster described by `cluster`
    async fn workload_cluster(&self, cluster: &ClusterRef) -> Result<Arc<dyn WorkloadCluster>>;
}

/// Workload cluster operations used by pod log collection
#[async_trait]
pub trait WorkloadCluster: Send + Sync {
    fn name(&self) -> &str;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn stream_container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        options: LogStreamOptions,
    ) -> Result<LogStream>;
}
