//! # Spec Checkpoints
//!
//! Logs when a spec starts and, on the second call, how long it ran.
//!
//! ```text
//! "Creating an AKS cluster" started at Tue, 22 Sep 2020 13:19:08 +0000
//! "Creating an AKS cluster" ran for 18m34s
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default)]
pub struct SpecCheckpoints {
    started: Mutex<HashMap<String, DateTime<Utc>>>,
}

/// Result of one [`SpecCheckpoints::checkpoint`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Started(DateTime<Utc>),
    Finished(Duration),
}

impl Checkpoint {
    /// Log line for the checkpoint named `text`
    pub fn message(&self, text: &str) -> String {
        match self {
            Self::Started(at) => format!(
                "{:?} started at {}",
                text,
                at.format("%a, %d %b %Y %H:%M:%S %z")
            ),
            Self::Finished(elapsed) => format!("{:?} ran for {}", text, format_elapsed(*elapsed)),
        }
    }
}

impl SpecCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&self, text: &str) -> Checkpoint {
        let now = Utc::now();
        let previous = {
            // A poisoned map still holds valid timestamps
            let mut started = self
                .started
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let previous = started.get(text).copied();
            if previous.is_none() {
                started.insert(text.to_string(), now);
            }
            previous
        };

        let checkpoint = match previous {
            None => Checkpoint::Started(now),
            Some(start) => {
                let elapsed = (now - start).to_std().unwrap_or_default();
                Checkpoint::Finished(Duration::from_secs(
                    elapsed.as_secs() + u64::from(elapsed.subsec_millis() >= 500),
                ))
            }
        };
        info!("{}", checkpoint.message(text));
        checkpoint
    }
}

/// `1h2m3s`, `18m34s`, `5s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
