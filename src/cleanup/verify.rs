//! # Leak Verification
//!
//! After teardown the cluster's resource group must be gone. Finding it, or
//! failing to find out, means Azure resources may be leaking.

use crate::azure::{ResourceGroupLookup, ResourceGroupStatus};
use crate::observability::metrics;
use anyhow::Result;
use tracing::{error, info};

/// Succeeds only when the lookup reports the resource group as not found
pub async fn expect_resource_group_to_be_404(
    lookup: &dyn ResourceGroupLookup,
    resource_group: &str,
) -> Result<()> {
    match lookup.resource_group_status(resource_group).await {
        Ok(ResourceGroupStatus::NotFound) => {
            metrics::record_leak_check("not_found");
            info!(resource_group, "Resource group is gone");
            Ok(())
        }
        Ok(ResourceGroupStatus::Exists) => {
            metrics::record_leak_check("exists");
            error!(resource_group, "Resource group still exists");
            Err(anyhow::anyhow!(
                "The resource group {resource_group} in Azure still exists. After deleting the cluster all of the Azure resources should also be deleted."
            ))
        }
        Err(e) => {
            metrics::record_leak_check("error");
            error!(resource_group, "Resource group lookup failed: {:#}", e);
            Err(e.context(format!(
                "Could not confirm that resource group {resource_group} was deleted"
            )))
        }
    }
}
