//! # Spec Configuration
//!
//! Everything one spec needs to know about its environment, built once at
//! spec start and passed explicitly to setup, the test body and teardown.
//! Subprocesses receive these values through [`SpecConfig::child_env`]; the
//! process environment is never modified.

use super::e2e::E2eConfig;
use crate::constants::{
    AKS_KUBERNETES_VERSION, AZURE_CLIENT_SECRET, AZURE_LOCATION, AZURE_RESOURCE_GROUP,
    AZURE_SSH_PUBLIC_KEY_FILE, AZURE_VNET_NAME, CLUSTER_IDENTITY_NAME, CLUSTER_IDENTITY_NAMESPACE,
    CLUSTER_IDENTITY_SECRET, CLUSTER_IDENTITY_SECRET_NAME, CLUSTER_IDENTITY_SECRET_NAMESPACE,
    CLUSTER_NAME, REDACT_LOG_SCRIPT,
};
use crate::error::SetupError;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone)]
pub struct SpecConfig {
    pub spec_name: String,
    /// Namespace on the management cluster hosting the spec's objects
    pub namespace: String,
    pub cluster_name: String,
    /// Resource group holding the cluster's Azure resources (same as the cluster name)
    pub resource_group: String,
    pub vnet_name: String,
    pub cluster_identity_name: Option<String>,
    pub cluster_identity_secret_name: String,
    pub client_secret: Option<String>,
    pub location: Option<String>,
    pub kubernetes_version: Option<String>,
    pub ssh_key_file: Option<PathBuf>,
    pub redact_script: PathBuf,
}

impl std::fmt::Debug for SpecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecConfig")
            .field("spec_name", &self.spec_name)
            .field("namespace", &self.namespace)
            .field("cluster_name", &self.cluster_name)
            .field("resource_group", &self.resource_group)
            .field("vnet_name", &self.vnet_name)
            .field("cluster_identity_name", &self.cluster_identity_name)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("location", &self.location)
            .field("kubernetes_version", &self.kubernetes_version)
            .field("redact_script", &self.redact_script)
            .finish_non_exhaustive()
    }
}

impl SpecConfig {
    /// Build the configuration of one spec
    ///
    /// `namespace` is the spec's namespace (also used as the cluster name
    /// prefix) and `flavor` the cluster template flavor. `CLUSTER_NAME`
    /// overrides the generated `<namespace>-<flavor>` cluster name.
    pub fn new(
        spec_name: &str,
        namespace: &str,
        flavor: &str,
        e2e: &E2eConfig,
    ) -> Result<Self, SetupError> {
        let redact_script = PathBuf::from(e2e.get_variable(REDACT_LOG_SCRIPT)?);

        let cluster_name = std::env::var(CLUSTER_NAME)
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{namespace}-{flavor}"));
        info!("Cluster name is {}", cluster_name);

        let variable_or_env = |name: &str| {
            e2e.variables
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
        };

        Ok(Self {
            spec_name: spec_name.to_string(),
            namespace: namespace.to_string(),
            resource_group: cluster_name.clone(),
            vnet_name: format!("{cluster_name}-vnet"),
            cluster_name,
            cluster_identity_name: variable_or_env(CLUSTER_IDENTITY_NAME),
            cluster_identity_secret_name: CLUSTER_IDENTITY_SECRET.to_string(),
            client_secret: std::env::var(AZURE_CLIENT_SECRET).ok(),
            location: variable_or_env(AZURE_LOCATION),
            kubernetes_version: variable_or_env(AKS_KUBERNETES_VERSION),
            ssh_key_file: std::env::var(AZURE_SSH_PUBLIC_KEY_FILE)
                .ok()
                .map(PathBuf::from),
            redact_script,
        })
    }

    /// Variables a subprocess working on this spec's cluster expects
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (AZURE_RESOURCE_GROUP, self.resource_group.clone()),
            (AZURE_VNET_NAME, self.vnet_name.clone()),
            (CLUSTER_IDENTITY_NAMESPACE, self.namespace.clone()),
            (
                CLUSTER_IDENTITY_SECRET_NAME,
                self.cluster_identity_secret_name.clone(),
            ),
            (CLUSTER_IDENTITY_SECRET_NAMESPACE, self.namespace.clone()),
        ];
        if let Some(identity) = &self.cluster_identity_name {
            env.push((CLUSTER_IDENTITY_NAME, identity.clone()));
        }
        if let Some(location) = &self.location {
            env.push((AZURE_LOCATION, location.clone()));
        }
        if let Some(version) = &self.kubernetes_version {
            env.push((AKS_KUBERNETES_VERSION, version.clone()));
        }
        env
    }
}

/// Random lowercase alphanumeric suffix for spec namespaces, e.g. `ab12cd`
pub fn random_suffix(len: usize) -> String {
    let mut suffix = String::with_capacity(len);
    while suffix.len() < len {
        suffix.extend(
            uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(len - suffix.len()),
        );
    }
    suffix
}
