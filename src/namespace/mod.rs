//! # Namespace Coordinator
//!
//! Gets or creates the namespace a spec runs in and attaches its event watch.
//!
//! ## Flow
//!
//! 1. Look the namespace up on the management cluster
//! 2. Create it when it does not exist (any other lookup error aborts setup)
//! 3. Start the event watch writing to
//!    `<artifacts>/clusters/<proxy>/resources/<namespace>/events.log`
//!
//! The returned [`WatchHandle`] is handed to teardown, which cancels it once.

mod watch;

pub use watch::{events_log_path, format_event, WatchHandle};

use crate::cluster::ClusterProxy;
use crate::constants::{
    CLUSTERCTL_MOVE_HIERARCHY_LABEL, CLUSTER_IDENTITY_SECRET, CLUSTER_IDENTITY_SECRET_KEY,
};
use crate::error::SetupError;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::core::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// How the spec namespace came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceOrigin {
    Created,
    Existing,
}

/// The namespace one spec runs in
#[derive(Debug, Clone)]
pub struct TestNamespace {
    pub namespace: Namespace,
    pub origin: NamespaceOrigin,
}

impl TestNamespace {
    pub fn name(&self) -> String {
        self.namespace.name_any()
    }
}

/// `<artifact_root>/clusters/<cluster_name>`
pub fn cluster_log_folder(artifact_root: &Path, cluster_name: &str) -> PathBuf {
    artifact_root.join("clusters").join(cluster_name)
}

/// Get or create `name` on the management cluster and start its event watch
pub async fn setup_spec_namespace(
    proxy: &dyn ClusterProxy,
    name: &str,
    artifact_root: &Path,
) -> Result<(TestNamespace, WatchHandle), SetupError> {
    let existing = proxy
        .get_namespace(name)
        .await
        .map_err(|source| SetupError::NamespaceLookup {
            name: name.to_string(),
            source,
        })?;

    let test_namespace = match existing {
        Some(namespace) => {
            info!("Using existing namespace {}", name);
            TestNamespace {
                namespace,
                origin: NamespaceOrigin::Existing,
            }
        }
        None => {
            info!("Creating namespace {}", name);
            let namespace = proxy.create_namespace(name).await.map_err(|source| {
                SetupError::NamespaceCreate {
                    name: name.to_string(),
                    source,
                }
            })?;
            TestNamespace {
                namespace,
                origin: NamespaceOrigin::Created,
            }
        }
    };

    let log_folder = cluster_log_folder(artifact_root, proxy.name());
    info!(
        "Creating event watcher for namespace {} in {}",
        name,
        log_folder.display()
    );
    let watch = WatchHandle::spawn(name, proxy.watch_namespace_events(name), &log_folder);

    Ok((test_namespace, watch))
}

/// Create the secret holding the service principal client secret
///
/// The secret carries the clusterctl move-hierarchy label so it follows the
/// cluster when it is pivoted.
pub async fn create_cluster_identity_secret(
    proxy: &dyn ClusterProxy,
    namespace: &str,
    client_secret: &str,
) -> Result<Secret, SetupError> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(CLUSTER_IDENTITY_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                CLUSTERCTL_MOVE_HIERARCHY_LABEL.to_string(),
                "true".to_string(),
            )])),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([(
            CLUSTER_IDENTITY_SECRET_KEY.to_string(),
            client_secret.to_string(),
        )])),
        ..Secret::default()
    };

    info!("Creating secret {}/{}", namespace, CLUSTER_IDENTITY_SECRET);
    proxy
        .create_secret(&secret)
        .await
        .map_err(|source| SetupError::SecretCreate {
            namespace: namespace.to_string(),
            name: CLUSTER_IDENTITY_SECRET.to_string(),
            source,
        })?;
    Ok(secret)
}
