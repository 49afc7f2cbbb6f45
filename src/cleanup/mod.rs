//! # Cleanup Orchestrator
//!
//! Tears a spec down in a fixed order:
//!
//! 1. Dump workload cluster logs (skipped when no cluster exists)
//! 2. Dump the Cluster API resources of the spec namespace
//! 3. Stop here when cleanup is skipped
//! 4. Delete every cluster in the namespace and wait
//! 5. Delete the namespace
//! 6. Run the caller's additional cleanup
//! 7. Verify the resource group is gone
//!
//! Steps 1 and 2 only warn. Failures of steps 4 to 7 are collected into a
//! [`TeardownError`] and later steps still run. Afterwards the namespace
//! watch is cancelled and logs are redacted, even when a step panicked.

mod redact;
mod verify;

pub use redact::{Redactor, ScriptRedactor};
pub use verify::expect_resource_group_to_be_404;

use crate::azure::ResourceGroupLookup;
use crate::cluster::{ClusterProxy, ClusterRef};
use crate::config::{IntervalsGetter, OrchestratorConfig, SpecConfig};
use crate::constants::WAIT_DELETE_CLUSTER;
use crate::error::{StepFailure, TeardownError};
use crate::logs::{collect_workload_cluster_logs, ActivityLogCollector, WorkloadLogDump};
use crate::namespace::{cluster_log_folder, WatchHandle};
use crate::observability::metrics;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    DumpWorkloadLogs,
    DumpResources,
    DeleteClusters,
    DeleteNamespace,
    AdditionalCleanup,
    VerifyNoLeakedResources,
    Finalize,
}

impl CleanupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DumpWorkloadLogs => "dump-workload-logs",
            Self::DumpResources => "dump-resources",
            Self::DeleteClusters => "delete-clusters",
            Self::DeleteNamespace => "delete-namespace",
            Self::AdditionalCleanup => "additional-cleanup",
            Self::VerifyNoLeakedResources => "verify-no-leaked-resources",
            Self::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied cleanup run after the namespace is deleted
pub type AdditionalCleanup =
    Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Everything one teardown needs
pub struct CleanupInput {
    pub spec_name: String,
    pub cluster_proxy: Arc<dyn ClusterProxy>,
    pub artifact_folder: PathBuf,
    pub namespace: String,
    pub watch: WatchHandle,
    /// Provisioned cluster, `None` when provisioning never returned one
    pub cluster: Option<ClusterRef>,
    /// Name used to look the cluster up when `cluster` is `None`
    pub cluster_name: String,
    pub resource_group: String,
    pub intervals: Arc<dyn IntervalsGetter>,
    pub skip_cleanup: bool,
    pub additional_cleanup: Option<AdditionalCleanup>,
}

impl std::fmt::Debug for CleanupInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupInput")
            .field("spec_name", &self.spec_name)
            .field("cluster_proxy", &self.cluster_proxy.name())
            .field("artifact_folder", &self.artifact_folder)
            .field("namespace", &self.namespace)
            .field("cluster", &self.cluster)
            .field("resource_group", &self.resource_group)
            .field("skip_cleanup", &self.skip_cleanup)
            .field("additional_cleanup", &self.additional_cleanup.is_some())
            .finish_non_exhaustive()
    }
}

impl CleanupInput {
    pub fn for_spec(
        spec: &SpecConfig,
        cluster_proxy: Arc<dyn ClusterProxy>,
        watch: WatchHandle,
        intervals: Arc<dyn IntervalsGetter>,
        artifact_folder: PathBuf,
    ) -> Self {
        Self {
            spec_name: spec.spec_name.clone(),
            cluster_proxy,
            artifact_folder,
            namespace: spec.namespace.clone(),
            watch,
            cluster: None,
            cluster_name: spec.cluster_name.clone(),
            resource_group: spec.resource_group.clone(),
            intervals,
            skip_cleanup: false,
            additional_cleanup: None,
        }
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: Option<ClusterRef>) -> Self {
        self.cluster = cluster;
        self
    }

    #[must_use]
    pub fn with_skip_cleanup(mut self, skip_cleanup: bool) -> Self {
        self.skip_cleanup = skip_cleanup;
        self
    }

    #[must_use]
    pub fn with_additional_cleanup(mut self, cleanup: AdditionalCleanup) -> Self {
        self.additional_cleanup = Some(cleanup);
        self
    }
}

/// What a teardown did
#[derive(Debug)]
pub struct CleanupReport {
    pub spec_name: String,
    pub completed: Vec<CleanupStep>,
    pub skipped: Vec<(CleanupStep, String)>,
    /// Failures of best-effort steps
    pub warnings: Vec<StepFailure>,
    pub failures: Vec<StepFailure>,
    pub workload_logs: Option<WorkloadLogDump>,
    /// Whether this teardown was the one that cancelled the watch
    pub watch_cancelled: bool,
}

impl CleanupReport {
    fn new(spec_name: &str) -> Self {
        Self {
            spec_name: spec_name.to_string(),
            completed: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            failures: Vec::new(),
            workload_logs: None,
            watch_cancelled: false,
        }
    }

    pub fn ran(&self, step: CleanupStep) -> bool {
        self.completed.contains(&step) || self.failures.iter().any(|f| f.step == step)
    }

    fn warn(&mut self, step: CleanupStep, err: &anyhow::Error) {
        warn!(spec = %self.spec_name, step = step.as_str(), "{:#}", err);
        self.warnings.push(StepFailure {
            step,
            message: format!("{err:#}"),
        });
    }

    fn fail(&mut self, step: CleanupStep, err: &anyhow::Error) {
        error!(spec = %self.spec_name, step = step.as_str(), "{:#}", err);
        metrics::record_cleanup_step_failure(step.as_str());
        self.failures.push(StepFailure {
            step,
            message: format!("{err:#}"),
        });
    }

    fn record(&mut self, step: CleanupStep, result: anyhow::Result<()>) {
        match result {
            Ok(()) => self.completed.push(step),
            Err(e) => self.fail(step, &e),
        }
    }

    fn into_result(self) -> Result<Self, TeardownError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(TeardownError::StepsFailed {
                spec: self.spec_name,
                failures: self.failures,
            })
        }
    }
}

/// Runs teardowns against one set of collaborators
#[derive(Clone)]
pub struct CleanupOrchestrator {
    config: OrchestratorConfig,
    resource_groups: Arc<dyn ResourceGroupLookup>,
    redactor: Arc<dyn Redactor>,
    activity_logs: Option<ActivityLogCollector>,
}

impl std::fmt::Debug for CleanupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupOrchestrator")
            .field("config", &self.config)
            .field("activity_logs", &self.activity_logs)
            .finish_non_exhaustive()
    }
}

impl CleanupOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        resource_groups: Arc<dyn ResourceGroupLookup>,
        redactor: Arc<dyn Redactor>,
    ) -> Self {
        Self {
            config,
            resource_groups,
            redactor,
            activity_logs: None,
        }
    }

    #[must_use]
    pub fn with_activity_logs(mut self, collector: ActivityLogCollector) -> Self {
        self.activity_logs = Some(collector);
        self
    }

    /// Run the whole teardown of one spec
    ///
    /// # Errors
    ///
    /// [`TeardownError`] lists every failed hard step. The watch is cancelled
    /// and logs are redacted before this returns, whatever happened.
    pub async fn dump_spec_resources_and_cleanup(
        &self,
        mut input: CleanupInput,
    ) -> Result<CleanupReport, TeardownError> {
        let mut report = CleanupReport::new(&input.spec_name);

        let steps = AssertUnwindSafe(self.run_steps(&mut input, &mut report))
            .catch_unwind()
            .await;

        self.finalize(&input.watch, &mut report).await;

        if let Err(panic) = steps {
            std::panic::resume_unwind(panic);
        }
        report.into_result()
    }

    async fn run_steps(&self, input: &mut CleanupInput, report: &mut CleanupReport) {
        let proxy = Arc::clone(&input.cluster_proxy);

        self.dump_workload_logs(input, report).await;

        info!(
            "Dumping all the Cluster API resources in the {:?} namespace",
            input.namespace
        );
        let resources_path =
            cluster_log_folder(&input.artifact_folder, proxy.name()).join("resources");
        match proxy
            .dump_all_resources(&input.namespace, &resources_path)
            .await
        {
            Ok(()) => report.completed.push(CleanupStep::DumpResources),
            Err(e) => report.warn(CleanupStep::DumpResources, &e),
        }

        if input.skip_cleanup {
            info!("Skipping cleanup of spec {:?}", input.spec_name);
            for step in [
                CleanupStep::DeleteClusters,
                CleanupStep::DeleteNamespace,
                CleanupStep::AdditionalCleanup,
                CleanupStep::VerifyNoLeakedResources,
            ] {
                report.skipped.push((step, "cleanup skipped".to_string()));
            }
            return;
        }

        info!("Deleting all clusters in the {} namespace", input.namespace);
        let intervals = input
            .intervals
            .intervals(&input.spec_name, WAIT_DELETE_CLUSTER);
        let deleted = proxy
            .delete_all_clusters_and_wait(&input.namespace, &intervals)
            .await;
        report.record(CleanupStep::DeleteClusters, deleted);

        info!(
            "Deleting namespace used for hosting the {:?} test spec",
            input.spec_name
        );
        let deleted = proxy.delete_namespace(&input.namespace).await;
        report.record(CleanupStep::DeleteNamespace, deleted);

        match input.additional_cleanup.take() {
            Some(cleanup) => {
                info!(
                    "Running additional cleanup for the {:?} test spec",
                    input.spec_name
                );
                report.record(CleanupStep::AdditionalCleanup, cleanup().await);
            }
            None => report.skipped.push((
                CleanupStep::AdditionalCleanup,
                "no additional cleanup".to_string(),
            )),
        }

        info!(
            "Checking if any resources are left over in Azure for spec {:?}",
            input.spec_name
        );
        let verified =
            expect_resource_group_to_be_404(self.resource_groups.as_ref(), &input.resource_group)
                .await;
        report.record(CleanupStep::VerifyNoLeakedResources, verified);
    }

    async fn dump_workload_logs(&self, input: &CleanupInput, report: &mut CleanupReport) {
        let proxy = input.cluster_proxy.as_ref();
        let cluster = match &input.cluster {
            Some(cluster) => Some(cluster.clone()),
            None => match proxy.find_cluster(&input.namespace, &input.cluster_name).await {
                Ok(found) => found,
                Err(e) => {
                    report.warn(CleanupStep::DumpWorkloadLogs, &e);
                    None
                }
            },
        };

        let Some(cluster) = cluster else {
            info!("Unable to dump workload cluster logs as the cluster is nil");
            report.skipped.push((
                CleanupStep::DumpWorkloadLogs,
                "workload cluster does not exist".to_string(),
            ));
            return;
        };

        info!("Dumping logs from the {:?} workload cluster", cluster.name);
        let output_root = cluster_log_folder(&input.artifact_folder, &cluster.name);
        let dump = collect_workload_cluster_logs(
            proxy,
            &cluster,
            &input.resource_group,
            self.activity_logs.as_ref(),
            &self.config,
            &output_root,
        )
        .await;
        report.workload_logs = Some(dump);
        report.completed.push(CleanupStep::DumpWorkloadLogs);
    }

    async fn finalize(&self, watch: &WatchHandle, report: &mut CleanupReport) {
        report.watch_cancelled = watch.cancel_and_wait().await;

        info!("Redacting sensitive information from logs");
        if let Err(e) = self.redactor.redact().await {
            warn!("Log redaction failed: {:#}", e);
        }
        report.completed.push(CleanupStep::Finalize);
    }
}
