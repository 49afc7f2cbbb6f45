//! # knarly-e2e
//!
//! Command-line entry point for the lifecycle steps that run outside a test
//! binary.
//!
//! ```bash
//! # Dump pod and activity logs of a workload cluster
//! knarly-e2e collect --namespace knarly-e2e-ab12cd --cluster knarly-e2e-ab12cd-aks
//!
//! # Tear a spec down and check for leaked Azure resources
//! knarly-e2e teardown --spec create-workload-cluster --namespace knarly-e2e-ab12cd \
//!     --flavor aks --e2e-config test/e2e/config/azure.yaml
//!
//! # Only run the leak check
//! knarly-e2e verify-deleted --resource-group knarly-e2e-ab12cd-aks
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use knarly_e2e::azure::{ArmClient, ResourceGroupLookup, UnavailableResourceGroups};
use knarly_e2e::cleanup::{
    expect_resource_group_to_be_404, CleanupInput, CleanupOrchestrator, ScriptRedactor,
};
use knarly_e2e::cluster::{ClusterProxy, KubeClusterProxy};
use knarly_e2e::config::{E2eConfig, OrchestratorConfig, SpecConfig};
use knarly_e2e::logs::{collect_workload_cluster_logs, ActivityLogCollector};
use knarly_e2e::namespace::{cluster_log_folder, WatchHandle};
use knarly_e2e::observability::{logging, metrics};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Knarly e2e lifecycle orchestrator
#[derive(Debug, Parser)]
#[command(name = "knarly-e2e", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubeconfig of the management cluster (defaults to the current context)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Name of the management cluster, used for its artifact folder
    #[arg(long, global = true, default_value = "bootstrap")]
    proxy_name: String,

    /// Artifact root, overrides ARTIFACTS_FOLDER
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect pod logs and Azure activity logs of a workload cluster
    Collect {
        /// Namespace of the Cluster object on the management cluster
        #[arg(long)]
        namespace: String,

        /// Name of the workload cluster
        #[arg(long)]
        cluster: String,

        /// Resource group to read activity logs for (defaults to the cluster name)
        #[arg(long)]
        resource_group: Option<String>,
    },
    /// Dump, delete and leak-check everything a spec created
    Teardown {
        /// Spec name, used to look up intervals
        #[arg(long)]
        spec: String,

        /// Spec namespace on the management cluster
        #[arg(long)]
        namespace: String,

        /// Cluster template flavor
        #[arg(long)]
        flavor: String,

        /// e2e configuration file
        #[arg(long, value_name = "PATH")]
        e2e_config: PathBuf,

        /// Dump logs and resources only
        #[arg(long)]
        skip_cleanup: bool,
    },
    /// Fail unless the resource group no longer exists
    VerifyDeleted {
        #[arg(long)]
        resource_group: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    logging::init_rustls();
    let mut config = OrchestratorConfig::from_env();
    if let Some(artifacts) = &cli.artifacts {
        config.artifacts_folder.clone_from(artifacts);
    }
    logging::init_tracing(&config)?;
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    info!("Starting knarly-e2e v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    metrics::register_metrics()?;

    let result = run(cli, &config).await;
    if let Err(e) = write_metrics(&config.artifacts_folder).await {
        warn!("Failed to write metrics: {:#}", e);
    }
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run(cli: Cli, config: &OrchestratorConfig) -> Result<()> {
    match cli.command {
        Commands::Collect {
            namespace,
            cluster,
            resource_group,
        } => {
            let proxy = connect(cli.kubeconfig.as_deref(), &cli.proxy_name).await?;
            let cluster_ref = proxy
                .find_cluster(&namespace, &cluster)
                .await?
                .with_context(|| format!("Cluster {namespace}/{cluster} not found"))?;

            // A one-shot dump has to end, so streams are read to their current end
            let config = config.snapshot();
            let resource_group = resource_group.unwrap_or_else(|| cluster.clone());
            let activity_logs = activity_log_collector(&config);
            let output_root = cluster_log_folder(&config.artifacts_folder, &cluster);

            let dump = collect_workload_cluster_logs(
                &proxy,
                &cluster_ref,
                &resource_group,
                activity_logs.as_ref(),
                &config,
                &output_root,
            )
            .await;
            let failed_streams = dump
                .pod_outcomes
                .iter()
                .flatten()
                .filter(|o| o.result.is_err())
                .count();
            info!(
                streams = dump.pod_targets.len(),
                failed_streams,
                activity_events = dump.activity.as_ref().map_or(0, |a| a.written),
                "Logs written to {}",
                output_root.display()
            );
            Ok(())
        }
        Commands::Teardown {
            spec,
            namespace,
            flavor,
            e2e_config,
            skip_cleanup,
        } => {
            let e2e = E2eConfig::load(&e2e_config)?;
            let spec = SpecConfig::new(&spec, &namespace, &flavor, &e2e)?;
            let proxy: Arc<dyn ClusterProxy> =
                Arc::new(connect(cli.kubeconfig.as_deref(), &cli.proxy_name).await?);

            // Azure lookups stay fallible so teardown still runs without credentials
            let (resource_groups, activity_logs) = match ArmClient::from_env() {
                Ok(arm) => {
                    let arm = Arc::new(arm);
                    let activity_logs = ActivityLogCollector::new(
                        Arc::clone(&arm) as _,
                        config.activity_log_window(),
                        config.activity_log_timeout(),
                    );
                    (arm as Arc<dyn ResourceGroupLookup>, Some(activity_logs))
                }
                Err(e) => {
                    error!("Azure client unavailable, leak check will fail: {:#}", e);
                    let lookup = UnavailableResourceGroups::new(format!("{e:#}"));
                    (Arc::new(lookup) as Arc<dyn ResourceGroupLookup>, None)
                }
            };
            let redactor =
                Arc::new(ScriptRedactor::new(&spec.redact_script).with_env(spec.child_env()));
            let mut orchestrator =
                CleanupOrchestrator::new(config.clone(), resource_groups, redactor);
            if let Some(activity_logs) = activity_logs {
                orchestrator = orchestrator.with_activity_logs(activity_logs);
            }

            let watch = WatchHandle::spawn(
                &spec.namespace,
                proxy.watch_namespace_events(&spec.namespace),
                &cluster_log_folder(&config.artifacts_folder, proxy.name()),
            );

            let input = CleanupInput::for_spec(
                &spec,
                proxy,
                watch,
                Arc::new(e2e),
                config.artifacts_folder.clone(),
            )
            .with_skip_cleanup(skip_cleanup);

            let report = orchestrator.dump_spec_resources_and_cleanup(input).await?;
            info!(
                spec = %report.spec_name,
                completed = report.completed.len(),
                skipped = report.skipped.len(),
                warnings = report.warnings.len(),
                "Teardown finished"
            );
            Ok(())
        }
        Commands::VerifyDeleted { resource_group } => {
            let arm = ArmClient::from_env()?;
            expect_resource_group_to_be_404(&arm, &resource_group).await
        }
    }
}

async fn connect(kubeconfig: Option<&Path>, name: &str) -> Result<KubeClusterProxy> {
    match kubeconfig {
        Some(path) => KubeClusterProxy::from_kubeconfig(name, path).await,
        None => KubeClusterProxy::try_default(name).await,
    }
}

/// Activity logs are optional when Azure credentials are not configured
fn activity_log_collector(config: &OrchestratorConfig) -> Option<ActivityLogCollector> {
    match ArmClient::from_env() {
        Ok(arm) => Some(ActivityLogCollector::new(
            Arc::new(arm),
            config.activity_log_window(),
            config.activity_log_timeout(),
        )),
        Err(e) => {
            warn!("Skipping activity logs: {:#}", e);
            None
        }
    }
}

async fn write_metrics(artifacts: &Path) -> Result<()> {
    let text = metrics::gather_text()?;
    tokio::fs::create_dir_all(artifacts).await?;
    let path = artifacts.join("metrics.prom");
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
