//! # kube-rs Cluster Proxy
//!
//! [`ClusterProxy`] and [`WorkloadCluster`] backed by real API servers.
//! Cluster API objects are accessed as [`DynamicObject`]s so no CRD types
//! have to be compiled in.

use super::resources::write_resource_yaml;
use super::{ClusterProxy, ClusterRef, EventStream, LogStream, LogStreamOptions, WorkloadCluster};
use crate::config::Intervals;
use crate::constants::CAPI_API_GROUPS;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Event, Namespace, Pod, Secret};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ObjectMeta, TypeMeta};
use kube::discovery::{verbs, ApiResource, Discovery, Scope};
use kube::{Client, Config, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Management cluster reachable through a kube [`Client`]
#[derive(Clone)]
pub struct KubeClusterProxy {
    name: String,
    client: Client,
}

impl std::fmt::Debug for KubeClusterProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl KubeClusterProxy {
    pub fn new(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Connect using the in-cluster config or the default kubeconfig
    pub async fn try_default(name: impl Into<String>) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client. Ensure cluster is accessible.")?;
        Ok(Self::new(name, client))
    }

    /// Connect using an explicit kubeconfig file
    pub async fn from_kubeconfig(name: impl Into<String>, path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let client = client_from_kubeconfig(kubeconfig).await?;
        Ok(Self::new(name, client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn capi_clusters(&self, namespace: &str) -> Api<DynamicObject> {
        let ar = ApiResource {
            group: "cluster.x-k8s.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "cluster.x-k8s.io/v1beta1".to_string(),
            kind: "Cluster".to_string(),
            plural: "clusters".to_string(),
        };
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }
}

async fn client_from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Client> {
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to load kubeconfig")?;
    Client::try_from(config).context("Failed to create Kubernetes client from kubeconfig")
}

#[async_trait]
impl ClusterProxy for KubeClusterProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get namespace {name}"))
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        namespaces
            .create(&PostParams::default(), &namespace)
            .await
            .with_context(|| format!("Failed to create namespace {name}"))
    }

    fn watch_namespace_events(&self, namespace: &str) -> EventStream {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        // Backoff keeps a persistent watch error from spinning
        watcher(events, watcher::Config::default())
            .default_backoff()
            .applied_objects()
            .map_err(anyhow::Error::from)
            .boxed()
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        secrets
            .create(&PostParams::default(), secret)
            .await
            .with_context(|| format!("Failed to create secret {namespace}/{}", secret.name_any()))?;
        Ok(())
    }

    async fn find_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterRef>> {
        let cluster = self
            .capi_clusters(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get cluster {namespace}/{name}"))?;
        Ok(cluster.map(|_| ClusterRef::new(namespace, name)))
    }

    async fn dump_all_resources(&self, namespace: &str, log_path: &Path) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .filter(CAPI_API_GROUPS)
            .run()
            .await
            .context("Failed to discover Cluster API resources")?;

        let mut dumped = 0usize;
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if caps.scope != Scope::Namespaced || !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                let api: Api<DynamicObject> =
                    Api::namespaced_with(self.client.clone(), namespace, &ar);
                let list = api
                    .list(&ListParams::default())
                    .await
                    .with_context(|| format!("Failed to list {} in {namespace}", ar.plural))?;
                for mut object in list.items {
                    object.types = Some(TypeMeta {
                        api_version: ar.api_version.clone(),
                        kind: ar.kind.clone(),
                    });
                    write_resource_yaml(log_path, namespace, &ar.kind, &object).await?;
                    dumped += 1;
                }
            }
        }

        debug!(namespace, dumped, "Dumped Cluster API resources");
        Ok(())
    }

    async fn delete_all_clusters_and_wait(
        &self,
        namespace: &str,
        intervals: &Intervals,
    ) -> Result<()> {
        let clusters = self.capi_clusters(namespace);
        let list = clusters
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list clusters in {namespace}"))?;

        for cluster in &list.items {
            let name = cluster.name_any();
            info!("Deleting cluster {}/{}", namespace, name);
            match clusters.delete(&name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    debug!("Cluster {}/{} already gone", namespace, name);
                }
                Err(e) => {
                    return Err(anyhow::Error::from(e)
                        .context(format!("Failed to delete cluster {namespace}/{name}")));
                }
            }
        }

        let start = Instant::now();
        loop {
            let remaining = clusters
                .list(&ListParams::default())
                .await
                .with_context(|| format!("Failed to list clusters in {namespace}"))?;
            if remaining.items.is_empty() {
                info!(
                    "All clusters in {} deleted after {:?}",
                    namespace,
                    start.elapsed()
                );
                return Ok(());
            }
            if start.elapsed() >= intervals.timeout {
                let names: Vec<String> = remaining.items.iter().map(ResourceExt::name_any).collect();
                return Err(anyhow::anyhow!(
                    "Clusters in namespace {} were not deleted within {:?}: {}",
                    namespace,
                    intervals.timeout,
                    names.join(", ")
                ));
            }
            tokio::time::sleep(intervals.poll).await;
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete namespace {name}"))?;
        Ok(())
    }

    async fn workload_cluster(&self, cluster: &ClusterRef) -> Result<Arc<dyn WorkloadCluster>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let secret_name = format!("{}-kubeconfig", cluster.name);
        let secret = secrets.get(&secret_name).await.with_context(|| {
            format!(
                "Failed to get kubeconfig secret {}/{}",
                cluster.namespace, secret_name
            )
        })?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get("value"))
            .ok_or_else(|| anyhow::anyhow!("Secret {secret_name} has no 'value' key"))?;
        let yaml = std::str::from_utf8(&value.0)
            .with_context(|| format!("Secret {secret_name} does not hold UTF-8 data"))?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .with_context(|| format!("Secret {secret_name} does not hold a kubeconfig"))?;
        let client = client_from_kubeconfig(kubeconfig).await?;

        Ok(Arc::new(KubeWorkloadCluster {
            name: cluster.name.clone(),
            client,
        }))
    }
}

/// Workload cluster reachable through its own kube [`Client`]
#[derive(Clone)]
pub struct KubeWorkloadCluster {
    name: String,
    client: Client,
}

impl std::fmt::Debug for KubeWorkloadCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkloadCluster")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WorkloadCluster for KubeWorkloadCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list pods in {namespace}"))?;
        Ok(list.items)
    }

    async fn stream_container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        options: LogStreamOptions,
    ) -> Result<LogStream> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            follow: options.follow,
            ..LogParams::default()
        };
        let stream = pods.log_stream(pod, &params).await.with_context(|| {
            format!("Failed to open log stream for {namespace}/{pod}/{container}")
        })?;
        Ok(Box::pin(stream))
    }
}
