//! Common test utilities
//!
//! In-memory collaborators for the cluster, Azure and redaction seams, plus
//! rustls setup for the Pact tests.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{
    Container, Event, Namespace, ObjectReference, Pod, PodSpec, Secret,
};
use knarly_e2e::azure::{ActivityLogPage, EventData, LocalizableString};
use knarly_e2e::azure::{ResourceGroupLookup, ResourceGroupStatus};
use knarly_e2e::cleanup::Redactor;
use knarly_e2e::cluster::{
    ClusterProxy, ClusterRef, EventStream, LogStream, LogStreamOptions, WorkloadCluster,
};
use knarly_e2e::config::Intervals;
use knarly_e2e::logs::ActivityLogSource;
use kube::core::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub fn event(reason: &str, message: &str) -> Event {
    Event {
        type_: Some("Normal".to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: ObjectReference {
            kind: Some("Cluster".to_string()),
            name: Some("c1".to_string()),
            ..ObjectReference::default()
        },
        ..Event::default()
    }
}

pub fn pod(name: &str, containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("kube-system".to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|c| Container {
                    name: (*c).to_string(),
                    ..Container::default()
                })
                .collect(),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

/// Behavior of one fake container log
#[derive(Debug, Clone)]
pub enum FakeLog {
    Lines(Vec<String>),
    /// Opening the stream fails
    OpenError,
    /// Some lines, then a read error
    BrokenAfter(Vec<String>),
    /// Some lines, then the connection drops mid-stream
    UnexpectedEof(Vec<String>),
    Panic,
}

#[derive(Debug, Default)]
pub struct FakeWorkloadCluster {
    pub name: String,
    pub pods: Vec<Pod>,
    pub logs: HashMap<(String, String), FakeLog>,
    pub fail_list: bool,
    pub streams_opened: AtomicUsize,
    /// Follow flag of every opened stream
    pub follow_requests: Mutex<Vec<bool>>,
}

impl FakeWorkloadCluster {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add a pod whose containers each log `<pod>/<container> line N`
    pub fn with_pod(mut self, name: &str, containers: &[&str]) -> Self {
        for container in containers {
            let lines = (1..=3)
                .map(|n| format!("{name}/{container} line {n}\n"))
                .collect();
            self.logs
                .insert((name.to_string(), (*container).to_string()), FakeLog::Lines(lines));
        }
        self.pods.push(pod(name, containers));
        self
    }

    pub fn with_log(mut self, pod: &str, container: &str, log: FakeLog) -> Self {
        self.logs
            .insert((pod.to_string(), container.to_string()), log);
        self
    }
}

fn chunks(lines: Vec<String>) -> Vec<std::io::Result<Vec<u8>>> {
    lines.into_iter().map(|l| Ok(l.into_bytes())).collect()
}

#[async_trait]
impl WorkloadCluster for FakeWorkloadCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>> {
        if self.fail_list {
            return Err(anyhow!("pods is forbidden"));
        }
        Ok(self.pods.clone())
    }

    async fn stream_container_logs(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        options: LogStreamOptions,
    ) -> Result<LogStream> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.follow_requests.lock().unwrap().push(options.follow);
        let log = self
            .logs
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .unwrap_or(FakeLog::Lines(Vec::new()));

        let items = match log {
            FakeLog::Lines(lines) => chunks(lines),
            FakeLog::OpenError => return Err(anyhow!("container {container} is not running")),
            FakeLog::BrokenAfter(lines) => {
                let mut items = chunks(lines);
                items.push(Err(std::io::Error::other("connection reset")));
                items
            }
            FakeLog::UnexpectedEof(lines) => {
                let mut items = chunks(lines);
                items.push(Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
                items
            }
            FakeLog::Panic => panic!("log stream for {pod}/{container} exploded"),
        };
        Ok(Box::pin(stream::iter(items).into_async_read()))
    }
}

/// Management cluster fake recording every mutating call
#[derive(Debug, Default)]
pub struct FakeClusterProxy {
    pub name: String,
    pub namespaces: Mutex<BTreeMap<String, Namespace>>,
    pub clusters: Mutex<Vec<ClusterRef>>,
    pub secrets: Mutex<Vec<Secret>>,
    pub events: Vec<Event>,
    pub workload: Option<Arc<FakeWorkloadCluster>>,
    pub calls: Mutex<Vec<String>>,
    /// Wait bounds received by each cluster deletion
    pub delete_intervals: Mutex<Vec<Intervals>>,
    pub create_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
    pub fail_lookup: bool,
    pub fail_secret: bool,
    pub fail_dump: bool,
    pub fail_delete_clusters: bool,
    pub fail_delete_namespace: bool,
    pub panic_on_delete_namespace: bool,
}

impl FakeClusterProxy {
    pub fn new() -> Self {
        Self {
            name: "bootstrap".to_string(),
            ..Self::default()
        }
    }

    pub fn with_namespace(self, name: &str) -> Self {
        self.namespaces
            .lock()
            .unwrap()
            .insert(name.to_string(), namespace(name));
        self
    }

    pub fn with_cluster(self, namespace: &str, name: &str) -> Self {
        self.clusters
            .lock()
            .unwrap()
            .push(ClusterRef::new(namespace, name));
        self
    }

    pub fn with_workload(mut self, workload: FakeWorkloadCluster) -> Self {
        self.workload = Some(Arc::new(workload));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ClusterProxy for FakeClusterProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        if self.fail_lookup {
            return Err(anyhow!("the server is currently unable to handle the request"));
        }
        Ok(self.namespaces.lock().unwrap().get(name).cloned())
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut namespaces = self.namespaces.lock().unwrap();
        if namespaces.contains_key(name) {
            return Err(anyhow!("namespaces \"{name}\" already exists"));
        }
        let ns = namespace(name);
        namespaces.insert(name.to_string(), ns.clone());
        Ok(ns)
    }

    fn watch_namespace_events(&self, _namespace: &str) -> EventStream {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        stream::iter(self.events.clone().into_iter().map(Ok))
            .chain(stream::pending())
            .boxed()
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        if self.fail_secret {
            return Err(anyhow!("secrets is forbidden"));
        }
        self.secrets.lock().unwrap().push(secret.clone());
        Ok(())
    }

    async fn find_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterRef>> {
        Ok(self
            .clusters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.namespace == namespace && c.name == name)
            .cloned())
    }

    async fn dump_all_resources(&self, namespace: &str, log_path: &Path) -> Result<()> {
        self.record("dump_all_resources");
        if self.fail_dump {
            return Err(anyhow!("failed to list machinepools"));
        }
        let dir = log_path.join(namespace).join("Cluster");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("dumped.yaml"), "kind: Cluster\n").await?;
        Ok(())
    }

    async fn delete_all_clusters_and_wait(
        &self,
        namespace: &str,
        intervals: &Intervals,
    ) -> Result<()> {
        self.record("delete_all_clusters_and_wait");
        self.delete_intervals.lock().unwrap().push(*intervals);
        if self.fail_delete_clusters {
            return Err(anyhow!("clusters in {namespace} were not deleted in time"));
        }
        self.clusters
            .lock()
            .unwrap()
            .retain(|c| c.namespace != namespace);
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.record("delete_namespace");
        if self.panic_on_delete_namespace {
            panic!("namespace deletion blew up");
        }
        if self.fail_delete_namespace {
            return Err(anyhow!("namespaces \"{name}\" is forbidden"));
        }
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn workload_cluster(&self, cluster: &ClusterRef) -> Result<Arc<dyn WorkloadCluster>> {
        match &self.workload {
            Some(workload) => Ok(Arc::clone(workload) as Arc<dyn WorkloadCluster>),
            None => Err(anyhow!("no kubeconfig secret for {}", cluster.name)),
        }
    }
}

pub fn activity_event(category: &str, timestamp: &str, id: &str) -> EventData {
    EventData {
        id: Some(id.to_string()),
        category: Some(LocalizableString {
            value: Some(category.to_string()),
            localized_value: Some(category.to_string()),
            ..LocalizableString::default()
        }),
        event_timestamp: Some(timestamp.to_string()),
        resource_group_name: Some("knarly-e2e-ab12cd-aks".to_string()),
        ..EventData::default()
    }
}

/// Serves a fixed list of pages linked as `page-1`, `page-2`, ...
#[derive(Debug, Default)]
pub struct FakeActivityLogSource {
    pub pages: Vec<Vec<EventData>>,
    /// Page index whose fetch fails
    pub fail_page: Option<usize>,
    /// Delay before each page is returned
    pub delay: Option<Duration>,
    pub filters: Mutex<Vec<String>>,
    pub fetches: AtomicUsize,
}

impl FakeActivityLogSource {
    pub fn with_pages(pages: Vec<Vec<EventData>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    async fn page(&self, index: usize) -> Result<ActivityLogPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_page == Some(index) {
            return Err(anyhow!("page {index} returned 500"));
        }
        let value = self.pages.get(index).cloned().unwrap_or_default();
        let next_link = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ActivityLogPage { value, next_link })
    }
}

#[async_trait]
impl ActivityLogSource for FakeActivityLogSource {
    async fn first_page(&self, filter: &str) -> Result<ActivityLogPage> {
        self.filters.lock().unwrap().push(filter.to_string());
        self.page(0).await
    }

    async fn next_page(&self, next_link: &str) -> Result<ActivityLogPage> {
        let index = next_link
            .strip_prefix("page-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("bad next link {next_link}"))?;
        self.page(index).await
    }
}

#[derive(Debug)]
pub struct FakeResourceGroups {
    pub status: Result<ResourceGroupStatus, String>,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeResourceGroups {
    pub fn returning(status: ResourceGroupStatus) -> Self {
        Self {
            status: Ok(status),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            status: Err(message.to_string()),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceGroupLookup for FakeResourceGroups {
    async fn resource_group_status(&self, name: &str) -> Result<ResourceGroupStatus> {
        self.lookups.lock().unwrap().push(name.to_string());
        self.status.clone().map_err(|message| anyhow!(message))
    }
}

#[derive(Debug, Default)]
pub struct CountingRedactor {
    pub runs: AtomicUsize,
}

impl CountingRedactor {
    pub fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Redactor for CountingRedactor {
    async fn redact(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
