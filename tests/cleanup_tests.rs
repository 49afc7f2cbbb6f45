//! Cleanup Orchestrator tests, including the full spec lifecycle

#[cfg(test)]
mod common;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use common::{
    activity_event, CountingRedactor, FakeActivityLogSource, FakeClusterProxy,
    FakeResourceGroups, FakeWorkloadCluster,
};
use futures::FutureExt;
use knarly_e2e::azure::{ResourceGroupStatus, UnavailableResourceGroups};
use knarly_e2e::cleanup::{CleanupInput, CleanupOrchestrator, CleanupStep};
use knarly_e2e::cluster::ClusterRef;
use knarly_e2e::config::{E2eConfig, Intervals, OrchestratorConfig};
use knarly_e2e::logs::{activity_log_path, ActivityLogCollector};
use knarly_e2e::namespace::{cluster_log_folder, setup_spec_namespace};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE: &str = "knarly-e2e-ab12cd";
const CLUSTER: &str = "knarly-e2e-ab12cd-aks";

struct Harness {
    proxy: Arc<FakeClusterProxy>,
    resource_groups: Arc<FakeResourceGroups>,
    redactor: Arc<CountingRedactor>,
}

impl Harness {
    fn new(proxy: FakeClusterProxy, resource_groups: FakeResourceGroups) -> Self {
        Self {
            proxy: Arc::new(proxy),
            resource_groups: Arc::new(resource_groups),
            redactor: Arc::new(CountingRedactor::default()),
        }
    }

    fn orchestrator(&self) -> CleanupOrchestrator {
        let config = OrchestratorConfig {
            wait_for_pod_logs: true,
            ..OrchestratorConfig::default()
        };
        CleanupOrchestrator::new(
            config,
            Arc::clone(&self.resource_groups) as _,
            Arc::clone(&self.redactor) as _,
        )
    }

    async fn input(&self, artifacts: &Path) -> CleanupInput {
        let (_ns, watch) = setup_spec_namespace(self.proxy.as_ref(), NAMESPACE, artifacts)
            .await
            .unwrap();
        CleanupInput {
            spec_name: "create-workload-cluster".to_string(),
            cluster_proxy: Arc::clone(&self.proxy) as _,
            artifact_folder: artifacts.to_path_buf(),
            namespace: NAMESPACE.to_string(),
            watch,
            cluster: Some(ClusterRef::new(NAMESPACE, CLUSTER)),
            cluster_name: CLUSTER.to_string(),
            resource_group: CLUSTER.to_string(),
            intervals: Arc::new(E2eConfig::default()),
            skip_cleanup: false,
            additional_cleanup: None,
        }
    }
}

#[tokio::test]
async fn test_full_teardown_runs_every_step_in_order() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new()
            .with_cluster(NAMESPACE, CLUSTER)
            .with_workload(FakeWorkloadCluster::new(CLUSTER).with_pod("coredns", &["coredns"])),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let input = harness.input(artifacts.path()).await;

    let report = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    assert_eq!(
        report.completed,
        vec![
            CleanupStep::DumpWorkloadLogs,
            CleanupStep::DumpResources,
            CleanupStep::DeleteClusters,
            CleanupStep::DeleteNamespace,
            CleanupStep::VerifyNoLeakedResources,
            CleanupStep::Finalize,
        ]
    );
    assert_eq!(
        harness.proxy.calls(),
        vec!["dump_all_resources", "delete_all_clusters_and_wait", "delete_namespace"]
    );
    assert!(report.watch_cancelled);
    assert_eq!(harness.redactor.count(), 1);
    assert_eq!(*harness.resource_groups.lookups.lock().unwrap(), vec![CLUSTER]);
    assert!(cluster_log_folder(artifacts.path(), "bootstrap")
        .join("resources")
        .join(NAMESPACE)
        .join("Cluster")
        .join("dumped.yaml")
        .exists());
}

#[tokio::test]
async fn test_skip_cleanup_stops_after_resource_dump() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new(),
        FakeResourceGroups::returning(ResourceGroupStatus::Exists),
    );
    let mut input = harness.input(artifacts.path()).await;
    input.cluster = None;
    input.skip_cleanup = true;

    let report = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    assert_eq!(harness.proxy.calls(), vec!["dump_all_resources"]);
    assert!(harness.resource_groups.lookups.lock().unwrap().is_empty());
    assert!(!report.ran(CleanupStep::DeleteClusters));
    assert!(!report.ran(CleanupStep::VerifyNoLeakedResources));
    assert!(report
        .skipped
        .iter()
        .any(|(step, _)| *step == CleanupStep::DumpWorkloadLogs));
    assert!(report.watch_cancelled);
    assert_eq!(harness.redactor.count(), 1);
}

#[tokio::test]
async fn test_leaked_resource_group_fails_teardown() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new(),
        FakeResourceGroups::returning(ResourceGroupStatus::Exists),
    );
    let input = harness.input(artifacts.path()).await;

    let err = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap_err();

    assert!(err.is_leak());
    assert!(err.to_string().contains("still exists"));
    assert_eq!(harness.redactor.count(), 1);
}

#[tokio::test]
async fn test_failed_lookup_is_not_treated_as_deleted() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new(),
        FakeResourceGroups::failing("AuthorizationFailed"),
    );
    let input = harness.input(artifacts.path()).await;

    let err = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap_err();

    assert!(err.is_leak());
}

#[tokio::test]
async fn test_missing_azure_client_still_tears_down() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new().with_cluster(NAMESPACE, CLUSTER),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let orchestrator = CleanupOrchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(UnavailableResourceGroups::new(
            "AZURE_SUBSCRIPTION_ID must be set to query Azure",
        )),
        Arc::clone(&harness.redactor) as _,
    );
    let input = harness.input(artifacts.path()).await;
    let token = input.watch.cancellation_token();

    let err = orchestrator
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap_err();

    assert!(err.is_leak());
    assert!(err.to_string().contains("AZURE_SUBSCRIPTION_ID"));
    assert_eq!(
        harness.proxy.calls(),
        vec!["dump_all_resources", "delete_all_clusters_and_wait", "delete_namespace"]
    );
    assert!(token.is_cancelled());
    assert_eq!(harness.redactor.count(), 1);
}

#[tokio::test]
async fn test_deletion_failures_do_not_stop_later_steps() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy {
            fail_dump: true,
            fail_delete_clusters: true,
            fail_delete_namespace: true,
            ..FakeClusterProxy::new()
        },
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let additional_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&additional_runs);
    let input = harness.input(artifacts.path()).await.with_additional_cleanup(Box::new(move || {
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }));

    let err = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap_err();

    let failed: Vec<CleanupStep> = err.failures().iter().map(|f| f.step).collect();
    assert_eq!(
        failed,
        vec![CleanupStep::DeleteClusters, CleanupStep::DeleteNamespace]
    );
    assert!(!err.is_leak());
    assert_eq!(additional_runs.load(Ordering::SeqCst), 1);
    assert_eq!(harness.resource_groups.lookups.lock().unwrap().len(), 1);
    assert_eq!(harness.redactor.count(), 1);
}

#[tokio::test]
async fn test_finalizer_runs_when_a_step_panics() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy {
            panic_on_delete_namespace: true,
            ..FakeClusterProxy::new()
        },
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let input = harness.input(artifacts.path()).await;
    let token = input.watch.cancellation_token();

    let orchestrator = harness.orchestrator();
    let result = std::panic::AssertUnwindSafe(orchestrator.dump_spec_resources_and_cleanup(input))
        .catch_unwind()
        .await;

    assert!(result.is_err());
    assert!(token.is_cancelled());
    assert_eq!(harness.redactor.count(), 1);
}

#[tokio::test]
async fn test_missing_cluster_is_recovered_by_name() {
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new()
            .with_cluster(NAMESPACE, CLUSTER)
            .with_workload(FakeWorkloadCluster::new(CLUSTER).with_pod("p", &["c"])),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let mut input = harness.input(artifacts.path()).await;
    input.cluster = None;

    let report = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    assert!(report.ran(CleanupStep::DumpWorkloadLogs));
    assert!(cluster_log_folder(artifacts.path(), CLUSTER)
        .join("kube-system/p/c.log")
        .exists());
}

#[tokio::test]
async fn test_workload_log_failures_only_warn() {
    let artifacts = tempfile::tempdir().unwrap();
    // No workload kubeconfig available
    let harness = Harness::new(
        FakeClusterProxy::new().with_cluster(NAMESPACE, CLUSTER),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let input = harness.input(artifacts.path()).await;

    let report = harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    assert!(report
        .workload_logs
        .as_ref()
        .is_some_and(|dump| dump.pod_targets.is_empty()));
}

#[tokio::test]
async fn test_cluster_deletion_uses_spec_intervals() {
    let e2e = E2eConfig::from_yaml(
        r#"
intervals:
  default/wait-delete-cluster: ["30m", "10s"]
  create-workload-cluster/wait-delete-cluster: ["45m", "15s"]
"#,
    )
    .unwrap();
    let artifacts = tempfile::tempdir().unwrap();
    let harness = Harness::new(
        FakeClusterProxy::new(),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );

    let mut input = harness.input(artifacts.path()).await;
    input.intervals = Arc::new(e2e.clone());
    harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    let mut input = harness.input(artifacts.path()).await;
    input.spec_name = "other-spec".to_string();
    input.intervals = Arc::new(e2e);
    harness
        .orchestrator()
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    assert_eq!(
        *harness.proxy.delete_intervals.lock().unwrap(),
        vec![
            Intervals {
                timeout: Duration::from_secs(45 * 60),
                poll: Duration::from_secs(15),
            },
            Intervals {
                timeout: Duration::from_secs(30 * 60),
                poll: Duration::from_secs(10),
            },
        ]
    );
}

/// Namespace setup, log collection and teardown of one spec
#[tokio::test]
async fn test_spec_lifecycle_end_to_end() {
    let artifacts = tempfile::tempdir().unwrap();
    let recent = |minutes: i64| {
        (Utc::now() - ChronoDuration::minutes(minutes)).to_rfc3339_opts(SecondsFormat::Secs, true)
    };
    let activity = Arc::new(FakeActivityLogSource::with_pages(vec![
        vec![
            activity_event("Administrative", &recent(50), "create-rg"),
            activity_event("Policy", &recent(45), "audit"),
        ],
        vec![activity_event("Administrative", &recent(10), "delete-rg")],
    ]));
    let harness = Harness::new(
        FakeClusterProxy::new()
            .with_cluster(NAMESPACE, CLUSTER)
            .with_workload(
                FakeWorkloadCluster::new(CLUSTER)
                    .with_pod("coredns-5d78c9869d-4x2lb", &["coredns"])
                    .with_pod("kube-proxy-7xk2p", &["kube-proxy"])
                    .with_pod("metrics-server-6f8c9d7b5-qv9rn", &["metrics-server"]),
            ),
        FakeResourceGroups::returning(ResourceGroupStatus::NotFound),
    );
    let orchestrator = harness.orchestrator().with_activity_logs(ActivityLogCollector::new(
        activity,
        Duration::from_secs(2 * 60 * 60),
        Duration::from_secs(30),
    ));
    let input = harness.input(artifacts.path()).await;

    let report = orchestrator
        .dump_spec_resources_and_cleanup(input)
        .await
        .unwrap();

    let cluster_folder = cluster_log_folder(artifacts.path(), CLUSTER);
    for (pod, container) in [
        ("coredns-5d78c9869d-4x2lb", "coredns"),
        ("kube-proxy-7xk2p", "kube-proxy"),
        ("metrics-server-6f8c9d7b5-qv9rn", "metrics-server"),
    ] {
        let path = cluster_folder
            .join("kube-system")
            .join(pod)
            .join(format!("{container}.log"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("{pod}/{container} line 1")));
    }

    let activity_log =
        std::fs::read_to_string(activity_log_path(&cluster_folder, CLUSTER)).unwrap();
    assert!(activity_log.contains("create-rg"));
    assert!(activity_log.contains("delete-rg"));
    assert!(!activity_log.contains("\"Policy\""));

    let dump = report.workload_logs.as_ref().unwrap();
    assert_eq!(dump.pod_targets.len(), 3);
    assert_eq!(dump.activity.as_ref().map(|a| a.written), Some(2));
    assert!(harness.proxy.namespaces.lock().unwrap().is_empty());
    assert!(harness.proxy.clusters.lock().unwrap().is_empty());
    assert_eq!(harness.redactor.count(), 1);
}
