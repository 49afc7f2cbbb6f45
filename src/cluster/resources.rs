//! # Resource Dump
//!
//! Writes Cluster API objects as YAML artifacts.

use anyhow::{Context, Result};
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::path::{Path, PathBuf};

/// Location of one dumped object: `<log_path>/<namespace>/<kind>/<name>.yaml`
pub fn resource_file_path(log_path: &Path, namespace: &str, kind: &str, name: &str) -> PathBuf {
    log_path
        .join(namespace)
        .join(kind)
        .join(format!("{name}.yaml"))
}

pub(crate) async fn write_resource_yaml(
    log_path: &Path,
    namespace: &str,
    kind: &str,
    object: &DynamicObject,
) -> Result<PathBuf> {
    let path = resource_file_path(log_path, namespace, kind, &object.name_any());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(object)
        .with_context(|| format!("Failed to serialize {kind} {}", object.name_any()))?;
    tokio::fs::write(&path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
