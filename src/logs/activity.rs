//! # Activity Log Collector
//!
//! Queries the activity log of one resource group over a trailing window and
//! appends every retained event to
//! `<output>/azure-activity-logs/<resourceGroup>.log`, pretty-printed with a
//! four-space indent, one object per line.
//!
//! The traversal is bounded by a single deadline covering every page fetch.
//! A failed or timed-out fetch ends the traversal; events already written
//! stay on disk.

use crate::azure::{ActivityLogPage, EventData};
use crate::constants::{ACTIVITY_LOG_FOLDER, POLICY_CATEGORY};
use crate::error::ActivityLogError;
use crate::observability::metrics;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Paginated activity log listing
#[async_trait]
pub trait ActivityLogSource: Send + Sync {
    /// First page of the listing for an OData `$filter`
    async fn first_page(&self, filter: &str) -> Result<ActivityLogPage>;

    /// Page behind a `nextLink` returned by a previous page
    async fn next_page(&self, next_link: &str) -> Result<ActivityLogPage>;
}

/// Time range and resource group of one activity log query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLogWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resource_group: String,
}

impl ActivityLogWindow {
    /// `[now - length, now]`
    pub fn trailing(resource_group: &str, length: Duration) -> Self {
        let end = Utc::now();
        let length = chrono::Duration::from_std(length).unwrap_or(chrono::Duration::MAX);
        Self {
            start: end.checked_sub_signed(length).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
            resource_group: resource_group.to_string(),
        }
    }

    /// OData filter sent to the service
    pub fn filter(&self) -> String {
        format!(
            "eventTimestamp ge '{}' and eventTimestamp le '{}' and resourceGroupName eq '{}'",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.resource_group
        )
    }

    /// `[start, end)`. The server filter is inclusive at `end`, so an event
    /// stamped exactly at `end` is dropped here.
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp < self.end
    }
}

/// Lazily walks the pages of one query
///
/// Each call to [`ActivityLogPager::next_event`] may fetch a page. Iteration
/// ends when a page carries no `nextLink`.
pub struct ActivityLogPager<'a> {
    source: &'a dyn ActivityLogSource,
    filter: String,
    timeout: Duration,
    deadline: Instant,
    buffered: VecDeque<EventData>,
    next_link: Option<String>,
    started: bool,
    pages: usize,
}

impl std::fmt::Debug for ActivityLogPager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogPager")
            .field("filter", &self.filter)
            .field("pages", &self.pages)
            .field("next_link", &self.next_link)
            .finish_non_exhaustive()
    }
}

impl<'a> ActivityLogPager<'a> {
    /// The deadline starts now and covers the whole traversal
    pub fn new(source: &'a dyn ActivityLogSource, filter: String, timeout: Duration) -> Self {
        Self {
            source,
            filter,
            timeout,
            deadline: Instant::now() + timeout,
            buffered: VecDeque::new(),
            next_link: None,
            started: false,
            pages: 0,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub async fn next_event(&mut self) -> Result<Option<EventData>, ActivityLogError> {
        loop {
            if let Some(event) = self.buffered.pop_front() {
                return Ok(Some(event));
            }

            let page = if self.started {
                let Some(link) = self.next_link.take() else {
                    return Ok(None);
                };
                tokio::time::timeout_at(self.deadline, self.source.next_page(&link))
                    .await
                    .map_err(|_elapsed| ActivityLogError::Timeout(self.timeout))?
                    .map_err(ActivityLogError::Page)?
            } else {
                self.started = true;
                tokio::time::timeout_at(self.deadline, self.source.first_page(&self.filter))
                    .await
                    .map_err(|_elapsed| ActivityLogError::Timeout(self.timeout))?
                    .map_err(ActivityLogError::Query)?
            };

            self.pages += 1;
            debug!(
                page = self.pages,
                events = page.value.len(),
                "Fetched activity log page"
            );
            self.buffered.extend(page.value);
            self.next_link = page.next_link.filter(|link| !link.is_empty());
        }
    }
}

/// What one collection run did
#[derive(Debug)]
pub struct ActivityLogSummary {
    /// Only created once the first page arrived
    pub path: PathBuf,
    pub written: usize,
    pub skipped_policy: usize,
    pub skipped_outside_window: usize,
    /// Error that ended the traversal early
    pub aborted: Option<ActivityLogError>,
}

#[derive(Clone)]
pub struct ActivityLogCollector {
    source: Arc<dyn ActivityLogSource>,
    window: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for ActivityLogCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogCollector")
            .field("window", &self.window)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `<output_root>/azure-activity-logs/<resource_group>.log`
pub fn activity_log_path(output_root: &Path, resource_group: &str) -> PathBuf {
    output_root
        .join(ACTIVITY_LOG_FOLDER)
        .join(format!("{resource_group}.log"))
}

impl ActivityLogCollector {
    pub fn new(source: Arc<dyn ActivityLogSource>, window: Duration, timeout: Duration) -> Self {
        Self {
            source,
            window,
            timeout,
        }
    }

    pub async fn collect(
        &self,
        resource_group: &str,
        output_root: &Path,
    ) -> Result<ActivityLogSummary, ActivityLogError> {
        let window = ActivityLogWindow::trailing(resource_group, self.window);
        self.collect_window(&window, output_root).await
    }

    /// Write the retained events of `window` and report what was written
    pub async fn collect_window(
        &self,
        window: &ActivityLogWindow,
        output_root: &Path,
    ) -> Result<ActivityLogSummary, ActivityLogError> {
        let path = activity_log_path(output_root, &window.resource_group);
        let mut summary = ActivityLogSummary {
            path: path.clone(),
            written: 0,
            skipped_policy: 0,
            skipped_outside_window: 0,
            aborted: None,
        };

        info!(
            resource_group = %window.resource_group,
            "Collecting activity logs from {} to {}",
            window.start,
            window.end
        );
        let mut pager = ActivityLogPager::new(self.source.as_ref(), window.filter(), self.timeout);

        // No file unless the query itself succeeded
        let mut pending = match pager.next_event().await {
            Err(e) if pager.pages_fetched() == 0 => {
                warn!(
                    resource_group = %window.resource_group,
                    "Activity log query failed: {}", e
                );
                summary.aborted = Some(e);
                return Ok(summary);
            }
            first => Some(first),
        };
        let mut out = open_output(&path).await?;

        loop {
            let next = match pending.take() {
                Some(first) => first,
                None => pager.next_event().await,
            };
            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        resource_group = %window.resource_group,
                        "Stopping activity log traversal: {}", e
                    );
                    summary.aborted = Some(e);
                    break;
                }
            };

            if event.category_value() == Some(POLICY_CATEGORY) {
                summary.skipped_policy += 1;
                metrics::record_activity_log_event("policy");
                continue;
            }
            if event.event_time().is_some_and(|ts| !window.contains(&ts)) {
                summary.skipped_outside_window += 1;
                metrics::record_activity_log_event("outside_window");
                continue;
            }

            let mut record = match to_indented_json(&event) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Failed to serialize activity log event: {}", e);
                    continue;
                }
            };
            record.push(b'\n');
            if let Err(e) = out.write_all(&record).await {
                warn!("Failed to write activity log event to {}: {}", path.display(), e);
                continue;
            }
            summary.written += 1;
            metrics::record_activity_log_event("written");
        }

        if let Err(e) = out.flush().await {
            warn!("Failed to flush {}: {}", path.display(), e);
        }
        info!(
            resource_group = %window.resource_group,
            written = summary.written,
            skipped_policy = summary.skipped_policy,
            pages = pager.pages_fetched(),
            "Activity log collection finished"
        );
        Ok(summary)
    }
}

async fn open_output(path: &Path) -> Result<BufWriter<File>, ActivityLogError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ActivityLogError::Output {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|source| ActivityLogError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BufWriter::new(file))
}

fn to_indented_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}
