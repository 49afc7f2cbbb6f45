//! # Resource Group Lookup
//!
//! `GET /subscriptions/{id}/resourcegroups/{name}`: 200 means the group still
//! exists, 404 means it is gone. Anything else is an error, never "gone".

use super::client::ArmClient;
use crate::constants::RESOURCE_GROUPS_API_VERSION;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceGroupStatus {
    Exists,
    NotFound,
}

#[async_trait]
pub trait ResourceGroupLookup: Send + Sync {
    async fn resource_group_status(&self, name: &str) -> Result<ResourceGroupStatus>;
}

/// Lookup used when no Azure client could be built
///
/// Every lookup fails, so teardown still runs and the leak check reports
/// why it could not confirm the deletion.
#[derive(Debug, Clone)]
pub struct UnavailableResourceGroups {
    reason: String,
}

impl UnavailableResourceGroups {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ResourceGroupLookup for UnavailableResourceGroups {
    async fn resource_group_status(&self, name: &str) -> Result<ResourceGroupStatus> {
        Err(anyhow::anyhow!(
            "Cannot look up resource group {name}, Azure client unavailable: {}",
            self.reason
        ))
    }
}

#[async_trait]
impl ResourceGroupLookup for ArmClient {
    async fn resource_group_status(&self, name: &str) -> Result<ResourceGroupStatus> {
        let url = self.subscription_url(&format!("/resourcegroups/{name}"));
        let response = self
            .get(&url, &[("api-version", RESOURCE_GROUPS_API_VERSION)])
            .await?;

        match response.status() {
            StatusCode::OK => Ok(ResourceGroupStatus::Exists),
            StatusCode::NOT_FOUND => {
                debug!("Resource group {} not found", name);
                Ok(ResourceGroupStatus::NotFound)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow::anyhow!(
                    "Unexpected status {status} looking up resource group {name}: {body}"
                ))
            }
        }
    }
}
