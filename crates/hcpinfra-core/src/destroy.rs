//! Reverse pipeline
//!
//! Own mode deletes the main resource group as a whole. Preserve mode keeps
//! the group and deletes only the children the cluster owns, in dependency
//! order, continuing past individual failures. Both modes finish by deleting
//! the vnet and nsg side groups if they exist.

use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::naming;
use crate::resource_group::ResourceGroupManager;
use hcpinfra_cloud::model::GenericResource;
use hcpinfra_cloud::{ActionType, ApplyResult, CancellationToken, CloudApi, CloudError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// API version for resource types missing from [`API_VERSIONS`].
pub const DEFAULT_API_VERSION: &str = "2021-04-01";

/// API versions used for delete-by-id.
pub const API_VERSIONS: &[(&str, &str)] = &[
    ("Microsoft.Network/publicIPAddresses", "2023-11-01"),
    ("Microsoft.Network/loadBalancers", "2023-11-01"),
    ("Microsoft.Network/networkInterfaces", "2023-11-01"),
    ("Microsoft.Network/networkSecurityGroups", "2023-11-01"),
    ("Microsoft.Network/virtualNetworks", "2023-11-01"),
    ("Microsoft.Network/privateDnsZones", "2020-06-01"),
    ("Microsoft.Network/privateDnsZones/virtualNetworkLinks", "2020-06-01"),
    ("Microsoft.Compute/virtualMachines", "2024-03-01"),
    ("Microsoft.Compute/disks", "2023-10-02"),
    ("Microsoft.Storage/storageAccounts", "2023-01-01"),
    ("Microsoft.ManagedIdentity/userAssignedIdentities", "2023-01-31"),
];

/// Resource types in the order they have to go. Anything else goes last.
pub const DELETION_ORDER: &[&str] = &[
    "Microsoft.Network/privateDnsZones/virtualNetworkLinks",
    "Microsoft.Compute/virtualMachines",
    "Microsoft.Network/networkInterfaces",
    "Microsoft.Network/loadBalancers",
    "Microsoft.Network/publicIPAddresses",
    "Microsoft.Compute/disks",
    "Microsoft.Network/networkSecurityGroups",
    "Microsoft.Network/virtualNetworks",
    "Microsoft.Network/privateDnsZones",
    "Microsoft.Storage/storageAccounts",
    "Microsoft.ManagedIdentity/userAssignedIdentities",
];

pub fn get_api_version_for_resource_type(resource_type: &str) -> &'static str {
    API_VERSIONS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(resource_type))
        .map(|(_, v)| *v)
        .unwrap_or(DEFAULT_API_VERSION)
}

/// Position of `resource_type` in [`DELETION_ORDER`]; lower goes first.
pub fn deletion_priority(resource_type: &str) -> usize {
    DELETION_ORDER
        .iter()
        .position(|t| t.eq_ignore_ascii_case(resource_type))
        .unwrap_or(DELETION_ORDER.len())
}

/// Stable sort by [`deletion_priority`].
pub fn sort_resources_by_deletion_order(resources: &mut [GenericResource]) {
    resources.sort_by_key(|r| deletion_priority(r.resource_type.as_deref().unwrap_or_default()));
}

/// Decides which children of a preserved resource group belong to the cluster.
pub trait ClusterOwnership: Send + Sync {
    fn is_cluster_owned(&self, resource: &GenericResource) -> bool;
}

/// Owned when the name contains the infra id or starts with the cluster's
/// private DNS zone prefix (`{name}-azurecluster.`).
#[derive(Debug, Clone)]
pub struct NameOwnership {
    infra_id: String,
    dns_zone_prefix: String,
}

impl NameOwnership {
    pub fn new(name: &str, infra_id: &str) -> Self {
        Self {
            infra_id: infra_id.to_string(),
            dns_zone_prefix: naming::private_dns_zone_prefix(name),
        }
    }
}

impl ClusterOwnership for NameOwnership {
    fn is_cluster_owned(&self, resource: &GenericResource) -> bool {
        let Some(name) = resource.name.as_deref() else {
            return false;
        };
        name.contains(&self.infra_id) || name.starts_with(&self.dns_zone_prefix)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestroyInfraOptions {
    pub name: String,
    pub infra_id: String,
    /// Main resource group; empty for `{name}-{infra_id}`
    pub resource_group_name: String,
    /// Keep the main group and delete only cluster-owned resources in it
    pub preserve_resource_group: bool,
}

/// The destroy orchestrator.
pub struct DestroyInfra {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
    ownership: Option<Box<dyn ClusterOwnership>>,
}

impl DestroyInfra {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self {
            cloud,
            cancel,
            ownership: None,
        }
    }

    /// Replace the default [`NameOwnership`] predicate used in preserve mode.
    pub fn with_ownership(mut self, ownership: Box<dyn ClusterOwnership>) -> Self {
        self.ownership = Some(ownership);
        self
    }

    #[instrument(skip_all, fields(cluster = %opts.name, infra_id = %opts.infra_id))]
    pub async fn run(&self, opts: &DestroyInfraOptions) -> Result<ApplyResult> {
        for (flag, value) in [("--name", &opts.name), ("--infra-id", &opts.infra_id)] {
            if value.is_empty() {
                return Err(InfraError::validation(format!("{} is required", flag)));
            }
        }

        let started = Instant::now();
        let mut result = ApplyResult::new();
        let groups = ResourceGroupManager::new(self.cloud.clone(), self.cancel.clone());
        let main_group =
            naming::resource_group_name(&opts.name, &opts.infra_id, &opts.resource_group_name);

        if opts.preserve_resource_group {
            let default_ownership = NameOwnership::new(&opts.name, &opts.infra_id);
            let ownership = self.ownership.as_deref().unwrap_or(&default_ownership);
            self.delete_cluster_resources_in_group(&main_group, ownership, &mut result)
                .await?;
        } else {
            let deleted = groups.delete(&main_group).await?;
            record_group(&mut result, &main_group, deleted);
        }

        for side in naming::side_resource_group_names(&opts.name, &opts.infra_id) {
            let deleted = groups.delete_if_exists(&side).await?;
            record_group(&mut result, &side, deleted);
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            deleted = result.count(ActionType::Delete),
            skipped = result.count(ActionType::Skip),
            failed = result.failed.len(),
            "Destroy finished"
        );
        Ok(result)
    }

    /// Delete the cluster-owned children of `resource_group`.
    ///
    /// Individual delete failures are logged and recorded in `result` but do
    /// not stop the loop. Only listing errors and cancellation end it early.
    pub async fn delete_cluster_resources_in_group(
        &self,
        resource_group: &str,
        ownership: &dyn ClusterOwnership,
        result: &mut ApplyResult,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        let listed = match self
            .cloud
            .list_resources_by_resource_group(resource_group)
            .collect_all()
            .await
        {
            Ok(listed) => listed,
            Err(e) if e.is_not_found() => {
                info!(resource_group, "Resource group not found, nothing to delete");
                return Ok(());
            }
            Err(e) => {
                return Err(e).step(format!("list resources in resource group {}", resource_group));
            }
        };

        let (mut owned, preserved): (Vec<_>, Vec<_>) =
            listed.into_iter().partition(|r| ownership.is_cluster_owned(r));
        for resource in &preserved {
            debug!(name = ?resource.name, "Preserving resource not owned by the cluster");
        }
        sort_resources_by_deletion_order(&mut owned);
        info!(
            resource_group,
            owned = owned.len(),
            preserved = preserved.len(),
            "Deleting cluster resources"
        );

        for resource in owned {
            let Some(id) = resource.id.as_deref() else {
                warn!(name = ?resource.name, "Listed resource has no id, skipping");
                continue;
            };
            let resource_type = resource.resource_type.as_deref().unwrap_or_default();
            let api_version = get_api_version_for_resource_type(resource_type);

            match self.delete_resource(id, api_version).await {
                Ok(true) => {
                    info!(id, "Deleted resource");
                    result.add_success(id, ActionType::Delete, "deleted");
                }
                Ok(false) => {
                    debug!(id, "Resource already gone");
                    result.add_success(id, ActionType::Skip, "not found");
                }
                Err(CloudError::Cancelled) => return Err(CloudError::Cancelled.into()),
                Err(e) => {
                    error!(id, error = %e, "Failed to delete resource");
                    result.add_failure(id, ActionType::Delete, e.to_string());
                }
            }
        }

        if !result.failed.is_empty() {
            warn!(
                failed = result.failed.len(),
                "Some resources could not be deleted; they are left in the resource group"
            );
        }
        Ok(())
    }

    /// `Ok(false)` when the resource was already gone.
    async fn delete_resource(&self, id: &str, api_version: &str) -> hcpinfra_cloud::Result<bool> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }
        let lro = match self.cloud.begin_delete_resource_by_id(id, api_version).await {
            Ok(lro) => lro,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        match lro.poll_until_done(&self.cancel).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn record_group(result: &mut ApplyResult, name: &str, deleted: bool) {
    if deleted {
        result.add_success(name, ActionType::Delete, "resource group deleted");
    } else {
        result.add_success(name, ActionType::Skip, "resource group not found");
    }
}
