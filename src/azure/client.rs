//! # Azure Resource Manager Client
//!
//! Thin authenticated REST client over `reqwest`. Tokens are requested per
//! call; the credential caches them.

use super::auth::AzureSettings;
use crate::constants::RESOURCE_MANAGER_SCOPE;
use anyhow::{Context, Result};
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use reqwest::{Client, Response};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ArmClient {
    http: Client,
    endpoint: String,
    subscription_id: String,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint)
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    pub fn new(
        endpoint: &str,
        subscription_id: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        // Create HTTP client with rustls
        let http = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            credential,
        })
    }

    /// Client bound to the subscription and credential found in the environment
    pub fn from_env() -> Result<Self> {
        let settings = AzureSettings::from_env()?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &AzureSettings) -> Result<Self> {
        Self::new(
            &settings.resource_manager_endpoint,
            &settings.subscription_id,
            settings.credential()?,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// `<endpoint>/subscriptions/<subscription><path>`
    pub(crate) fn subscription_url(&self, path: &str) -> String {
        format!(
            "{}/subscriptions/{}{}",
            self.endpoint, self.subscription_id, path
        )
    }

    async fn get_token(&self) -> Result<String> {
        let token_response = self
            .credential
            .get_token(
                &[RESOURCE_MANAGER_SCOPE],
                Some(TokenRequestOptions::default()),
            )
            .await
            .context("Failed to get Azure Resource Manager access token")?;
        Ok(token_response.token.secret().to_string())
    }

    /// Authenticated GET
    pub(crate) async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let token = self.get_token().await?;
        debug!("GET {}", url);
        self.http
            .get(url)
            .query(query)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))
    }
}
