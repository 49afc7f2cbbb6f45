//! # Namespace Event Watch
//!
//! One background task per spec namespace appends every observed event to
//! `<log_folder>/resources/<namespace>/events.log` until its [`WatchHandle`]
//! is cancelled.

use crate::cluster::EventStream;
use anyhow::{Context, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancellation handle for a namespace event watch
///
/// Dropping the handle cancels the watch as well, so the background task can
/// never outlive the spec that owns it.
#[derive(Debug)]
pub struct WatchHandle {
    namespace: String,
    token: CancellationToken,
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    /// Start the watch task for `namespace`
    pub fn spawn(namespace: &str, events: EventStream, log_folder: &Path) -> Self {
        let token = CancellationToken::new();
        let log_file = events_log_path(log_folder, namespace);
        let task_token = token.clone();
        let task_namespace = namespace.to_string();

        let task = tokio::spawn(async move {
            if let Err(e) = watch_events(events, &log_file, task_token).await {
                warn!(
                    namespace = %task_namespace,
                    "Namespace event watch stopped: {:#}", e
                );
            }
        });

        Self {
            namespace: namespace.to_string(),
            token,
            cancelled: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cancel the watch
    ///
    /// Returns `true` for the call that actually cancelled it; later calls
    /// are no-ops that return `false`.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(namespace = %self.namespace, "Event watch already cancelled");
            return false;
        }
        info!("Cancelling event watch for namespace {}", self.namespace);
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Token observing this watch's cancellation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the watch and wait for the task to flush and exit
    ///
    /// Returns what [`WatchHandle::cancel`] returned.
    pub async fn cancel_and_wait(&self) -> bool {
        let cancelled = self.cancel();
        self.join().await;
        cancelled
    }

    /// Wait for the watch task to exit
    pub async fn join(&self) {
        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(namespace = %self.namespace, "Event watch task panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// `<log_folder>/resources/<namespace>/events.log`
pub fn events_log_path(log_folder: &Path, namespace: &str) -> PathBuf {
    log_folder
        .join("resources")
        .join(namespace)
        .join("events.log")
}

async fn watch_events(
    mut events: EventStream,
    log_file: &Path,
    token: CancellationToken,
) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file)
        .await
        .with_context(|| format!("Failed to open {}", log_file.display()))?;
    let mut out = tokio::io::BufWriter::new(file);

    let result = loop {
        tokio::select! {
            () = token.cancelled() => break Ok(()),
            next = events.next() => match next {
                Some(Ok(event)) => {
                    // Flushed per event so the log is readable while the spec runs
                    let written = async {
                        out.write_all(format_event(&event).as_bytes()).await?;
                        out.flush().await
                    };
                    if let Err(e) = written.await {
                        break Err(anyhow::Error::from(e).context("Failed to write event"));
                    }
                }
                Some(Err(e)) => warn!("Error watching namespace events: {}", e),
                None => break Ok(()),
            }
        }
    };

    out.flush().await.context("Failed to flush events log")?;
    result
}

/// Multi-line record for one event
pub fn format_event(event: &Event) -> String {
    let object = &event.involved_object;
    format!(
        "[{}] {}\n\tresource: {}/{}/{}\n\tmessage: {}\n\tcount: {}\n\tlast seen: {}\n",
        event.type_.as_deref().unwrap_or("Unknown"),
        event.reason.as_deref().unwrap_or(""),
        object.kind.as_deref().unwrap_or(""),
        object.namespace.as_deref().unwrap_or(""),
        object.name.as_deref().unwrap_or(""),
        event.message.as_deref().unwrap_or("").trim_end(),
        event.count.unwrap_or(1),
        event
            .last_timestamp
            .as_ref()
            .map(|t| t.0.to_string())
            .unwrap_or_default(),
    )
}
