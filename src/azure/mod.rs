//! # Azure
//!
//! Azure Resource Manager access used by the activity log collector and the
//! leak verifier.
//!
//! - [`auth`]: settings and credentials from the environment
//! - [`client`]: authenticated ARM REST client
//! - [`activity_log`]: activity log listing and the [`EventData`] envelope
//! - [`resource_groups`]: resource group existence lookup

pub mod activity_log;
pub mod auth;
pub mod client;
pub mod resource_groups;

pub use activity_log::{ActivityLogPage, EventData, LocalizableString};
pub use auth::{AzureSettings, MockTokenCredential};
pub use client::ArmClient;
pub use resource_groups::{ResourceGroupLookup, ResourceGroupStatus, UnavailableResourceGroups};
