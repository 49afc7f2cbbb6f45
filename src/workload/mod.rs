//! # Workload Runs
//!
//! Test bodies are external programs. This module builds their invocations
//! and runs them: combined output is logged verbatim and a non-zero exit is a
//! hard failure carrying that output.
//!
//! clusterloader2 is driven through `CL2_*` variables:
//!
//! | Scenario | Variables |
//! |---|---|
//! | Pod churn | `CL2_NS_COUNT`, `CL2_CLEANUP`, `CL2_REPEATS`, `CL2_POD_START_TIMEOUT_MINS`, `CL2_PODS_PER_NODE`, `CL2_TARGET_POD_CHURN`, `CL2_PODS_PER_DEPLOYMENT` |
//! | StatefulSet scaling | `CL2_NAMESPACES`, `CL2_INSTANCES_PER_NAMESPACE`, `CL2_TOTAL_SCALE_STEPS`, `CL2_STEP_DELAY_MINUTES`, `CL2_PVC_STORAGE_CLASS`, `CL2_PVC_STORAGE_QUANTITY`, `CL2_POD_MANAGEMENT_POLICY` |

use crate::error::ExternalToolError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info};

/// Namespaces the churn workload spreads its deployments over
const POD_CHURN_NAMESPACES: u32 = 15;

/// Deployment churn parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodChurnTestConfig {
    /// Delete the pods after the run
    pub cleanup: bool,
    pub churn_iterations: u32,
    pub pod_start_timeout_mins: u32,
    pub pods_per_node: u32,
    /// Pods created and deleted per second
    pub pod_churn_rate: u32,
    /// Replica cap of one deployment
    pub pods_per_deployment: u32,
}

impl PodChurnTestConfig {
    fn cl2_env(&self) -> Vec<(String, String)> {
        [
            ("CL2_NS_COUNT", POD_CHURN_NAMESPACES.to_string()),
            ("CL2_CLEANUP", u32::from(self.cleanup).to_string()),
            ("CL2_REPEATS", self.churn_iterations.to_string()),
            (
                "CL2_POD_START_TIMEOUT_MINS",
                self.pod_start_timeout_mins.to_string(),
            ),
            ("CL2_PODS_PER_NODE", self.pods_per_node.to_string()),
            ("CL2_TARGET_POD_CHURN", self.pod_churn_rate.to_string()),
            ("CL2_PODS_PER_DEPLOYMENT", self.pods_per_deployment.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// StatefulSet scale-up parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulSetTestConfig {
    pub namespaces: u32,
    pub instances_per_namespace: u32,
    pub total_scale_steps: u32,
    pub step_delay_minutes: u32,
    pub pvc_storage_class: String,
    pub pvc_storage_quantity: String,
    /// `Parallel` or `OrderedReady`
    pub pod_management_policy: String,
}

impl StatefulSetTestConfig {
    fn cl2_env(&self) -> Vec<(String, String)> {
        [
            ("CL2_NAMESPACES", self.namespaces.to_string()),
            (
                "CL2_INSTANCES_PER_NAMESPACE",
                self.instances_per_namespace.to_string(),
            ),
            ("CL2_TOTAL_SCALE_STEPS", self.total_scale_steps.to_string()),
            ("CL2_STEP_DELAY_MINUTES", self.step_delay_minutes.to_string()),
            ("CL2_PVC_STORAGE_CLASS", self.pvc_storage_class.clone()),
            ("CL2_PVC_STORAGE_QUANTITY", self.pvc_storage_quantity.clone()),
            (
                "CL2_POD_MANAGEMENT_POLICY",
                self.pod_management_policy.clone(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// One clusterloader2 invocation
#[derive(Debug, Clone)]
pub struct ClusterLoaderRun {
    pub binary: PathBuf,
    pub test_config: PathBuf,
    pub provider: String,
    pub kubeconfig: PathBuf,
    pub verbosity: u8,
    pub enable_exec_service: bool,
    /// Working directory, usually the repository root
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ClusterLoaderRun {
    /// Deployment churn against the cluster behind `kubeconfig`
    pub fn pod_churn(repo_root: &Path, kubeconfig: &Path, config: &PodChurnTestConfig) -> Self {
        Self::for_workload(
            repo_root,
            "test/workloads/deployment-churn/config.yaml",
            kubeconfig,
            config.cl2_env(),
        )
    }

    pub fn stateful_set(
        repo_root: &Path,
        kubeconfig: &Path,
        config: &StatefulSetTestConfig,
    ) -> Self {
        Self::for_workload(
            repo_root,
            "test/workloads/statefulset/config.yaml",
            kubeconfig,
            config.cl2_env(),
        )
    }

    fn for_workload(
        repo_root: &Path,
        test_config: &str,
        kubeconfig: &Path,
        env: Vec<(String, String)>,
    ) -> Self {
        Self {
            binary: repo_root.join("perf-tests/clusterloader2/cmd/clusterloader"),
            test_config: repo_root.join(test_config),
            provider: "aks".to_string(),
            kubeconfig: kubeconfig.to_path_buf(),
            verbosity: 2,
            enable_exec_service: false,
            working_dir: Some(repo_root.to_path_buf()),
            env,
        }
    }

    /// Additional variables, e.g. [`crate::config::SpecConfig::child_env`]
    #[must_use]
    pub fn with_env<K: Into<String>>(mut self, env: impl IntoIterator<Item = (K, String)>) -> Self {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--testconfig={}", self.test_config.display()),
            format!("--provider={}", self.provider),
            format!("--kubeconfig={}", self.kubeconfig.display()),
            format!("--v={}", self.verbosity),
            format!("--enable-exec-service={}", self.enable_exec_service),
        ]
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(self.args());
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Run to completion and return the combined output
    pub async fn run(&self) -> Result<String, ExternalToolError> {
        run_to_completion(self.command()).await
    }
}

/// Run `command`, log its combined output and fail on non-zero exit
pub async fn run_to_completion(mut command: Command) -> Result<String, ExternalToolError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    info!("Running {}", program);

    let output = command
        .output()
        .await
        .map_err(|source| ExternalToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    info!("{}", combined);

    if output.status.success() {
        Ok(combined)
    } else {
        error!("{} exited with {}", program, output.status);
        Err(ExternalToolError::Failed {
            program,
            status: output.status,
            output: combined,
        })
    }
}
