//! # Azure Authentication
//!
//! Credentials are derived from the same environment variables the Azure CLI
//! and SDKs use:
//!
//! - `AZURE_SUBSCRIPTION_ID` (required)
//! - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`: service principal
//! - `AZURE_FEDERATED_TOKEN_FILE`: Workload Identity
//! - nothing else: Managed Identity
//!
//! `AZURE_RESOURCE_MANAGER_ENDPOINT` points the client at another cloud or, in
//! contract tests, at a mock server.

use crate::constants::{AZURE_CLIENT_SECRET, DEFAULT_RESOURCE_MANAGER_ENDPOINT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use azure_core::credentials::{AccessToken, Secret, TokenCredential, TokenRequestOptions};
use azure_identity::{ClientSecretCredential, ManagedIdentityCredential, WorkloadIdentityCredential};
use std::sync::Arc;
use tracing::{debug, info};

/// Mock TokenCredential for Pact testing
/// Returns a dummy token without attempting real Azure authentication
#[derive(Debug)]
pub struct MockTokenCredential;

#[async_trait]
impl TokenCredential for MockTokenCredential {
    async fn get_token(
        &self,
        _scopes: &[&str],
        _options: Option<TokenRequestOptions<'_>>,
    ) -> azure_core::Result<AccessToken> {
        use typespec_client_core::time::{Duration, OffsetDateTime};

        Ok(AccessToken::new(
            Secret::new("test-token".to_string()),
            OffsetDateTime::now_utc() + Duration::seconds(3600),
        ))
    }
}

#[derive(Clone)]
pub struct AzureSettings {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub federated_token_file: Option<String>,
    pub resource_manager_endpoint: String,
    /// Use [`MockTokenCredential`] instead of a real credential
    pub pact_mode: bool,
}

impl std::fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSettings")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("resource_manager_endpoint", &self.resource_manager_endpoint)
            .field("pact_mode", &self.pact_mode)
            .finish_non_exhaustive()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl AzureSettings {
    pub fn from_env() -> Result<Self> {
        let subscription_id = non_empty_env("AZURE_SUBSCRIPTION_ID")
            .context("AZURE_SUBSCRIPTION_ID must be set to query Azure")?;
        let resource_manager_endpoint = non_empty_env("AZURE_RESOURCE_MANAGER_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string());

        Ok(Self {
            subscription_id,
            tenant_id: non_empty_env("AZURE_TENANT_ID"),
            client_id: non_empty_env("AZURE_CLIENT_ID"),
            client_secret: non_empty_env(AZURE_CLIENT_SECRET),
            federated_token_file: non_empty_env("AZURE_FEDERATED_TOKEN_FILE"),
            resource_manager_endpoint: resource_manager_endpoint
                .trim_end_matches('/')
                .to_string(),
            pact_mode: std::env::var("PACT_MODE").is_ok(),
        })
    }

    /// Build the credential matching the configured authentication method
    pub fn credential(&self) -> Result<Arc<dyn TokenCredential>> {
        if self.pact_mode {
            debug!("Pact mode: using mock Azure credential");
            return Ok(Arc::new(MockTokenCredential));
        }

        let credential: Arc<dyn TokenCredential> = match (
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                info!(
                    "Using Azure service principal authentication with client ID: {}",
                    client_id
                );
                ClientSecretCredential::new(
                    tenant_id,
                    client_id.clone(),
                    Secret::new(client_secret.clone()),
                    None,
                )
                .context("Failed to create ClientSecretCredential")?
            }
            (_, Some(client_id), None) if self.federated_token_file.is_some() => {
                info!(
                    "Using Azure Workload Identity authentication with client ID: {}",
                    client_id
                );
                let options = azure_identity::WorkloadIdentityCredentialOptions {
                    client_id: Some(client_id.clone()),
                    ..Default::default()
                };
                WorkloadIdentityCredential::new(Some(options))
                    .context("Failed to create WorkloadIdentityCredential")?
            }
            _ => {
                info!("No service principal configured, using Managed Identity");
                ManagedIdentityCredential::new(None)
                    .context("Failed to create ManagedIdentityCredential")?
            }
        };
        Ok(credential)
    }
}
