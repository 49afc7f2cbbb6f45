//! # Activity Log Listing
//!
//! `GET /subscriptions/{id}/providers/Microsoft.Insights/eventtypes/management/values`
//!
//! [`EventData`] mirrors the service's event envelope field for field. Fields
//! this type does not name are kept in [`EventData::additional`], so writing
//! an event back out never drops data.

use super::client::ArmClient;
use crate::constants::ACTIVITY_LOG_API_VERSION;
use crate::logs::ActivityLogSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableString {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localized_value: Option<String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderAuthorization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

/// One activity log event
///
/// Timestamps are kept as the service sent them; see
/// [`EventData::event_time`] for the parsed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<SenderAuthorization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_provider_name: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_status: Option<LocalizableString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Fields without a typed counterpart
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl EventData {
    pub fn category_value(&self) -> Option<&str> {
        self.category.as_ref().and_then(|c| c.value.as_deref())
    }

    /// `eventTimestamp` parsed as RFC3339, `None` when absent or malformed
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.event_timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// One page of the listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityLogPage {
    #[serde(default)]
    pub value: Vec<EventData>,
    #[serde(rename = "nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl ArmClient {
    async fn activity_log_page(&self, url: &str, query: &[(&str, &str)]) -> Result<ActivityLogPage> {
        let response = self.get(url, query).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Activity log request failed with status {status}: {body}"
            ));
        }
        response
            .json::<ActivityLogPage>()
            .await
            .context("Failed to parse activity log page")
    }
}

#[async_trait]
impl ActivityLogSource for ArmClient {
    async fn first_page(&self, filter: &str) -> Result<ActivityLogPage> {
        let url = self.subscription_url(
            "/providers/Microsoft.Insights/eventtypes/management/values",
        );
        self.activity_log_page(
            &url,
            &[("api-version", ACTIVITY_LOG_API_VERSION), ("$filter", filter)],
        )
        .await
    }

    async fn next_page(&self, next_link: &str) -> Result<ActivityLogPage> {
        // nextLink already carries api-version, filter and skip token
        self.activity_log_page(next_link, &[]).await
    }
}
