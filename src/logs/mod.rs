//! # Workload Cluster Logs
//!
//! Diagnostics gathered from a workload cluster at teardown:
//!
//! - container logs of the system namespace ([`pods`])
//! - the Azure activity log of the cluster's resource group ([`activity`])
//!
//! Both land under `<artifacts>/clusters/<clusterName>`. Nothing here fails
//! the caller; problems are logged and reflected in [`WorkloadLogDump`].

pub mod activity;
pub mod pods;

pub use activity::{
    activity_log_path, ActivityLogCollector, ActivityLogPager, ActivityLogSource,
    ActivityLogSummary, ActivityLogWindow,
};
pub use pods::{log_targets, LogCollectionTarget, LogTaskOutcome, PodLogCollection, PodLogCollector};

use crate::cluster::{ClusterProxy, ClusterRef};
use crate::config::OrchestratorConfig;
use std::path::Path;
use tracing::{info, warn};

/// What one workload log dump started or finished
#[derive(Debug, Default)]
pub struct WorkloadLogDump {
    /// Every container log stream that was started
    pub pod_targets: Vec<LogCollectionTarget>,
    /// Outcomes of the log tasks, only when they were waited for
    pub pod_outcomes: Option<Vec<LogTaskOutcome>>,
    pub activity: Option<ActivityLogSummary>,
}

/// Dump the pod logs and activity log of `cluster` below `output_root`
///
/// Pod log tasks are detached unless `WAIT_FOR_POD_LOGS` is set. The
/// activity log is collected while they stream.
pub async fn collect_workload_cluster_logs(
    proxy: &dyn ClusterProxy,
    cluster: &ClusterRef,
    resource_group: &str,
    activity_logs: Option<&ActivityLogCollector>,
    config: &OrchestratorConfig,
    output_root: &Path,
) -> WorkloadLogDump {
    let mut dump = WorkloadLogDump::default();

    let collection = match proxy.workload_cluster(cluster).await {
        Ok(workload) => {
            let collector = PodLogCollector::from_config(workload, config);
            match collector.collect(&config.system_namespace, output_root).await {
                Ok(collection) => Some(collection),
                Err(e) => {
                    warn!(
                        cluster = %cluster.name,
                        "Failed to start pod log collection: {:#}", e
                    );
                    None
                }
            }
        }
        Err(e) => {
            warn!(
                cluster = %cluster.name,
                "Failed to get workload cluster client: {:#}", e
            );
            None
        }
    };

    if let Some(collection) = &collection {
        dump.pod_targets = collection.targets().to_vec();
    }

    // Pod logs keep streaming while the activity log is fetched
    let pending = match collection {
        Some(collection) if config.wait_for_pod_logs => Some(collection),
        Some(collection) => {
            drop(collection.detach());
            None
        }
        None => None,
    };

    match activity_logs {
        Some(collector) => match collector.collect(resource_group, output_root).await {
            Ok(summary) => dump.activity = Some(summary),
            Err(e) => warn!(resource_group, "Failed to collect activity logs: {}", e),
        },
        None => info!("Activity log collection disabled"),
    }

    if let Some(collection) = pending {
        dump.pod_outcomes = Some(collection.wait().await);
    }
    dump
}
