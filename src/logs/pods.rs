//! # Pod Log Collector
//!
//! One task per (pod, container) streams the container log to
//! `<output>/<namespace>/<pod>/<container>.log`.
//!
//! Tasks never fail their caller. Each one turns every failure, panics
//! included, into a [`LogTaskOutcome`]. Concurrency is capped by a semaphore
//! and the tasks live in a [`JoinSet`] so callers can either
//! [`PodLogCollection::detach`] them (a supervisor only logs outcomes) or
//! [`PodLogCollection::wait`] for them.

use crate::cluster::{LogStreamOptions, WorkloadCluster};
use crate::config::OrchestratorConfig;
use crate::error::LogStreamError;
use crate::observability::metrics;
use anyhow::Result;
use futures::{AsyncReadExt, FutureExt};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::any::Any;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// One container log and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCollectionTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub path: PathBuf,
}

impl LogCollectionTarget {
    pub fn new(output_root: &Path, namespace: &str, pod: &str, container: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            path: output_root
                .join(namespace)
                .join(pod)
                .join(format!("{container}.log")),
        }
    }
}

/// Targets for every container of every pod
pub fn log_targets(pods: &[Pod], namespace: &str, output_root: &Path) -> Vec<LogCollectionTarget> {
    pods.iter()
        .flat_map(|pod| {
            let pod_name = pod.name_any();
            pod.spec
                .iter()
                .flat_map(|spec| spec.containers.iter())
                .map(move |container| {
                    LogCollectionTarget::new(output_root, namespace, &pod_name, &container.name)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Result of one streaming task, bytes copied on success
#[derive(Debug)]
pub struct LogTaskOutcome {
    pub target: LogCollectionTarget,
    pub result: Result<u64, LogStreamError>,
}

impl LogTaskOutcome {
    fn metric_label(&self) -> &'static str {
        match &self.result {
            Ok(_) => "completed",
            Err(LogStreamError::Panicked(_)) => "panicked",
            Err(e) if e.is_local() => "local_error",
            Err(_) => "stream_error",
        }
    }
}

#[derive(Clone)]
pub struct PodLogCollector {
    cluster: Arc<dyn WorkloadCluster>,
    limit: Option<Arc<Semaphore>>,
    follow: bool,
}

impl std::fmt::Debug for PodLogCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodLogCollector")
            .field("cluster", &self.cluster.name())
            .field(
                "limit",
                &self.limit.as_ref().map(|s| s.available_permits()),
            )
            .field("follow", &self.follow)
            .finish()
    }
}

impl PodLogCollector {
    /// `max_concurrent` of `None` leaves the fan-out unbounded
    pub fn new(cluster: Arc<dyn WorkloadCluster>, max_concurrent: Option<usize>, follow: bool) -> Self {
        Self {
            cluster,
            limit: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            follow,
        }
    }

    pub fn from_config(cluster: Arc<dyn WorkloadCluster>, config: &OrchestratorConfig) -> Self {
        Self::new(cluster, config.log_stream_limit(), config.follow_pod_logs)
    }

    /// List the pods of `namespace` and start one task per container
    ///
    /// Only the pod listing can fail; the returned collection owns the tasks.
    pub async fn collect(&self, namespace: &str, output_root: &Path) -> Result<PodLogCollection> {
        let pods = self.cluster.list_pods(namespace).await?;
        let targets = log_targets(&pods, namespace, output_root);
        info!(
            cluster = self.cluster.name(),
            namespace,
            pods = pods.len(),
            streams = targets.len(),
            "Collecting pod logs"
        );
        Ok(self.spawn(targets))
    }

    /// Start one task per target
    pub fn spawn(&self, targets: Vec<LogCollectionTarget>) -> PodLogCollection {
        let mut tasks = JoinSet::new();
        for target in targets.iter().cloned() {
            let cluster = Arc::clone(&self.cluster);
            let limit = self.limit.as_ref().map(Arc::clone);
            let options = LogStreamOptions {
                follow: self.follow,
            };
            tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let result = AssertUnwindSafe(stream_to_file(cluster.as_ref(), &target, options))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(LogStreamError::Panicked(panic_message(panic.as_ref())))
                    });
                LogTaskOutcome { target, result }
            });
        }
        PodLogCollection { tasks, targets }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn stream_to_file(
    cluster: &dyn WorkloadCluster,
    target: &LogCollectionTarget,
    options: LogStreamOptions,
) -> Result<u64, LogStreamError> {
    if let Some(dir) = target.path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LogStreamError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
    }
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&target.path)
        .await
        .map_err(|source| LogStreamError::OpenFile {
            path: target.path.clone(),
            source,
        })?;
    let mut writer = tokio::io::BufWriter::new(file);

    let copied = copy_container_log(cluster, target, options, &mut writer).await;
    let flushed = writer.flush().await.map_err(LogStreamError::Stream);
    let copied = copied?;
    flushed?;
    Ok(copied)
}

async fn copy_container_log(
    cluster: &dyn WorkloadCluster,
    target: &LogCollectionTarget,
    options: LogStreamOptions,
    writer: &mut tokio::io::BufWriter<tokio::fs::File>,
) -> Result<u64, LogStreamError> {
    let mut stream = cluster
        .stream_container_logs(&target.namespace, &target.pod, &target.container, options)
        .await
        .map_err(LogStreamError::OpenStream)?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let read = match stream.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => read,
            // Streams cut off by the API server end like this
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(LogStreamError::Stream(e)),
        };
        writer
            .write_all(&buffer[..read])
            .await
            .map_err(LogStreamError::Stream)?;
        copied += read as u64;
    }
    Ok(copied)
}

/// Running log tasks of one collection pass
#[derive(Debug)]
pub struct PodLogCollection {
    tasks: JoinSet<LogTaskOutcome>,
    targets: Vec<LogCollectionTarget>,
}

impl PodLogCollection {
    pub fn targets(&self) -> &[LogCollectionTarget] {
        &self.targets
    }

    /// Let the tasks run on; a supervisor logs each outcome as it arrives
    pub fn detach(self) -> JoinHandle<Vec<LogTaskOutcome>> {
        tokio::spawn(self.wait())
    }

    /// Wait for every task and return the outcomes in completion order
    pub async fn wait(mut self) -> Vec<LogTaskOutcome> {
        let mut outcomes = Vec::with_capacity(self.targets.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report_outcome(&outcome);
                    outcomes.push(outcome);
                }
                Err(e) => warn!("Pod log task did not complete: {}", e),
            }
        }
        outcomes
    }
}

fn report_outcome(outcome: &LogTaskOutcome) {
    let target = &outcome.target;
    metrics::record_pod_log_stream(outcome.metric_label());
    match &outcome.result {
        Ok(bytes) => debug!(
            pod = %target.pod,
            container = %target.container,
            bytes,
            "Pod log stream finished"
        ),
        Err(e) if e.is_local() => error!(
            pod = %target.pod,
            container = %target.container,
            "Cannot write pod logs: {}", e
        ),
        Err(e) => warn!(
            pod = %target.pod,
            container = %target.container,
            "Pod log stream failed: {}", e
        ),
    }
}
