//! # Log Redaction
//!
//! Scrubs secrets from collected artifacts once teardown is done.

use crate::workload::run_to_completion;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

#[async_trait]
pub trait Redactor: Send + Sync {
    async fn redact(&self) -> Result<()>;
}

/// Runs the configured redaction script without arguments
#[derive(Debug, Clone)]
pub struct ScriptRedactor {
    script: PathBuf,
    env: Vec<(String, String)>,
}

impl ScriptRedactor {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_env<K: Into<String>>(mut self, env: impl IntoIterator<Item = (K, String)>) -> Self {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }
}

#[async_trait]
impl Redactor for ScriptRedactor {
    async fn redact(&self) -> Result<()> {
        let mut command = Command::new(&self.script);
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        run_to_completion(command).await?;
        Ok(())
    }
}
