//! # Constants
//!
//! Shared names and defaults used throughout the orchestrator.
//!
//! Environment variable names match the ones the cluster templates and
//! external scripts expect, so they are passed to subprocesses verbatim.

/// Resource group holding every Azure resource of the workload cluster
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";

/// Virtual network created for the workload cluster
pub const AZURE_VNET_NAME: &str = "AZURE_VNET_NAME";

pub const CLUSTER_IDENTITY_NAME: &str = "CLUSTER_IDENTITY_NAME";

pub const CLUSTER_IDENTITY_NAMESPACE: &str = "CLUSTER_IDENTITY_NAMESPACE";

pub const CLUSTER_IDENTITY_SECRET_NAME: &str = "AZURE_CLUSTER_IDENTITY_SECRET_NAME";

pub const CLUSTER_IDENTITY_SECRET_NAMESPACE: &str = "AZURE_CLUSTER_IDENTITY_SECRET_NAMESPACE";

pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

pub const AZURE_SSH_PUBLIC_KEY_FILE: &str = "AZURE_SSH_PUBLIC_KEY_FILE";

/// e2e config variable naming the log redaction script
pub const REDACT_LOG_SCRIPT: &str = "REDACT_LOG_SCRIPT";

pub const AKS_KUBERNETES_VERSION: &str = "AKS_KUBERNETES_VERSION";

pub const AZURE_LOCATION: &str = "AZURE_LOCATION";

/// Overrides the generated cluster name when set
pub const CLUSTER_NAME: &str = "CLUSTER_NAME";

/// Namespace whose pods are streamed when dumping workload cluster logs
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kube-system";

/// Folder (under the cluster log folder) holding activity log dumps
pub const ACTIVITY_LOG_FOLDER: &str = "azure-activity-logs";

/// Events whose category equals this value are never written
pub const POLICY_CATEGORY: &str = "Policy";

/// Name of the secret carrying the service principal client secret
pub const CLUSTER_IDENTITY_SECRET: &str = "cluster-identity-secret";

/// Key of the client secret inside the identity secret
pub const CLUSTER_IDENTITY_SECRET_KEY: &str = "clientSecret";

/// clusterctl label marking objects that must move with the cluster
pub const CLUSTERCTL_MOVE_HIERARCHY_LABEL: &str = "clusterctl.cluster.x-k8s.io/move-hierarchy";

/// Interval key used when waiting for cluster deletion
pub const WAIT_DELETE_CLUSTER: &str = "wait-delete-cluster";

/// Default trailing activity log window (seconds)
pub const DEFAULT_ACTIVITY_LOG_WINDOW_SECS: u64 = 2 * 60 * 60;

/// Default timeout for a whole activity log traversal (seconds)
pub const DEFAULT_ACTIVITY_LOG_TIMEOUT_SECS: u64 = 30;

/// Default cap on concurrently streaming pod log tasks
pub const DEFAULT_MAX_CONCURRENT_LOG_STREAMS: usize = 64;

/// Fallback timeout when an interval is not configured (seconds)
pub const DEFAULT_INTERVAL_TIMEOUT_SECS: u64 = 30 * 60;

/// Fallback poll period when an interval is not configured (seconds)
pub const DEFAULT_INTERVAL_POLL_SECS: u64 = 10;

/// Azure Resource Manager endpoint for the public cloud
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";

/// Token scope for Azure Resource Manager
pub const RESOURCE_MANAGER_SCOPE: &str = "https://management.azure.com/.default";

pub const ACTIVITY_LOG_API_VERSION: &str = "2015-04-01";

pub const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

/// Cluster API groups whose objects are included in resource dumps
pub const CAPI_API_GROUPS: &[&str] = &[
    "cluster.x-k8s.io",
    "infrastructure.cluster.x-k8s.io",
    "controlplane.cluster.x-k8s.io",
    "bootstrap.cluster.x-k8s.io",
    "addons.cluster.x-k8s.io",
    "exp.infrastructure.cluster.x-k8s.io",
];
