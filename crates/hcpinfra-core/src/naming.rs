//! Deterministic names, resource paths and the RBAC component mapping
//!
//! Everything here is pure: the same inputs always produce the same names,
//! which is what lets `create` be re-run and `destroy` find what `create`
//! made without any local state.

use crate::error::{InfraError, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Built-in Contributor role.
pub const CONTRIBUTOR_ROLE_ID: &str = "b24988ac-6180-42a0-ab88-20f7382dd24c";

pub const CONTROL_PLANE_OPERATOR_ROLE_ID: &str = "7d8bb4e4-6fa7-4545-96cf-20fce11b705d";
pub const CLOUD_PROVIDER_ROLE_ID: &str = "a1f96423-95ce-4224-ab27-4e3dc72facd4";
pub const INGRESS_ROLE_ID: &str = "0336e1d3-7a87-462b-b6db-342b63f7802c";
pub const IMAGE_REGISTRY_ROLE_ID: &str = "8b32b316-c2f5-4ddf-b05b-83dacd2d08b5";
pub const AZURE_FILE_ROLE_ID: &str = "0d7aedc0-15fd-4a67-a412-efad370c947e";
pub const AZURE_DISK_ROLE_ID: &str = "5b7237c5-45e1-49d6-bc18-a1f62f400748";
pub const NETWORK_ROLE_ID: &str = "be7a6435-15ae-4171-8f30-4a343eff9e8f";

/// Suffix appended to a component name for data-plane role assignments.
pub const DATA_PLANE_SUFFIX: &str = "WI";

pub const NSG_SIDE_GROUP: &str = "nsg";
pub const VNET_SIDE_GROUP: &str = "vnet";

/// Main resource group: the caller-supplied name, or `{name}-{infra_id}`.
pub fn resource_group_name(name: &str, infra_id: &str, resource_group_name: &str) -> String {
    if resource_group_name.is_empty() {
        format!("{}-{}", name, infra_id)
    } else {
        resource_group_name.to_string()
    }
}

/// `{name}-nsg` / `{name}-vnet`, the sub-name handed to the resource-group manager.
pub fn side_group_sub_name(name: &str, side: &str) -> String {
    format!("{}-{}", name, side)
}

/// `{name}-{side}-{infra_id}`
pub fn side_resource_group_name(name: &str, side: &str, infra_id: &str) -> String {
    format!("{}-{}", side_group_sub_name(name, side), infra_id)
}

/// Side resource groups in the order destroy removes them.
pub fn side_resource_group_names(name: &str, infra_id: &str) -> Vec<String> {
    vec![
        side_resource_group_name(name, VNET_SIDE_GROUP, infra_id),
        side_resource_group_name(name, NSG_SIDE_GROUP, infra_id),
    ]
}

pub fn resource_group_scope(subscription_id: &str, resource_group: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}",
        subscription_id, resource_group
    )
}

pub fn role_definition_id(subscription_id: &str, role: &str) -> String {
    format!(
        "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
        subscription_id, role
    )
}

/// Role assignment names must be GUIDs; derive one from what makes the
/// assignment unique to this cluster.
pub fn role_assignment_name(infra_id: &str, component: &str, scope: &str) -> String {
    let seed = format!("{}{}{}", infra_id, component, scope);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
}

/// Identity resource name: `{base}-{infra_id}`.
pub fn identity_name(base: &str, infra_id: &str) -> String {
    format!("{}-{}", base, infra_id)
}

pub fn security_group_name(name: &str, infra_id: &str) -> String {
    format!("{}-{}-nsg", name, infra_id)
}

pub fn virtual_network_name(name: &str, infra_id: &str) -> String {
    format!("{}-{}", name, infra_id)
}

pub fn private_dns_zone_name(name: &str, base_domain: &str) -> String {
    format!("{}-azurecluster.{}", name, base_domain)
}

/// Prefix shared by every private DNS zone a cluster creates.
pub fn private_dns_zone_prefix(name: &str) -> String {
    format!("{}-azurecluster.", name)
}

pub fn private_dns_zone_link_name(name: &str, infra_id: &str) -> String {
    format!("{}-{}", name, infra_id)
}

/// Component that receives role assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RbacComponent {
    ControlPlaneOperator,
    NodePoolManagement,
    CloudProvider,
    AzureFile,
    AzureDisk,
    Ingress,
    Network,
    ImageRegistry,
}

impl RbacComponent {
    pub fn name(self) -> &'static str {
        match self {
            Self::ControlPlaneOperator => "cpo",
            Self::NodePoolManagement => "nodepoolmgmt",
            Self::CloudProvider => "cloudprovider",
            Self::AzureFile => "azurefile",
            Self::AzureDisk => "azuredisk",
            Self::Ingress => "ingress",
            Self::Network => "cncc",
            Self::ImageRegistry => "ciro",
        }
    }

    /// Component name used for the data-plane assignment of the same workload.
    pub fn data_plane_name(self) -> String {
        format!("{}{}", self.name(), DATA_PLANE_SUFFIX)
    }

    /// Component-specific role used when custom HCP roles are requested.
    pub fn custom_role(self) -> &'static str {
        match self {
            Self::ControlPlaneOperator => CONTROL_PLANE_OPERATOR_ROLE_ID,
            Self::NodePoolManagement => CONTRIBUTOR_ROLE_ID,
            Self::CloudProvider => CLOUD_PROVIDER_ROLE_ID,
            Self::AzureFile => AZURE_FILE_ROLE_ID,
            Self::AzureDisk => AZURE_DISK_ROLE_ID,
            Self::Ingress => INGRESS_ROLE_ID,
            Self::Network => NETWORK_ROLE_ID,
            Self::ImageRegistry => IMAGE_REGISTRY_ROLE_ID,
        }
    }
}

impl fmt::Display for RbacComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource groups a component may be granted access to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeGroups {
    pub main: String,
    pub nsg: String,
    pub vnet: String,
    /// Resource group of the public DNS zone, empty when unknown
    pub dns_zone: String,
}

/// Role definition and resource-group scopes for a component.
///
/// Every component gets the main resource group; network-facing components
/// additionally get the NSG, VNet and DNS zone groups they touch. Scopes are
/// de-duplicated so a shared resource group is only assigned once.
pub fn role_and_scopes(
    subscription_id: &str,
    groups: &ScopeGroups,
    component: RbacComponent,
    custom_roles: bool,
) -> (&'static str, Vec<String>) {
    let role = if custom_roles {
        component.custom_role()
    } else {
        CONTRIBUTOR_ROLE_ID
    };

    let managed = groups.main.as_str();
    let nsg = groups.nsg.as_str();
    let vnet = groups.vnet.as_str();
    let dns_zone = groups.dns_zone.as_str();

    let groups: Vec<&str> = match component {
        RbacComponent::ControlPlaneOperator
        | RbacComponent::CloudProvider
        | RbacComponent::AzureFile => vec![managed, nsg, vnet],
        RbacComponent::NodePoolManagement | RbacComponent::Network => vec![managed, vnet],
        RbacComponent::Ingress => vec![managed, vnet, dns_zone],
        RbacComponent::AzureDisk | RbacComponent::ImageRegistry => vec![managed],
    };

    let mut scopes: Vec<String> = Vec::new();
    for group in groups.into_iter().filter(|g| !g.is_empty()) {
        let scope = resource_group_scope(subscription_id, group);
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    (role, scopes)
}

/// Parsed `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}/...` path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// `(type, name)` pairs, outermost first
    pub segments: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = |reason: &str| InfraError::InvalidResourceId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = id.trim_matches('/').split('/').collect();
        if parts.len() < 8 {
            return Err(invalid("expected /subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}"));
        }
        if !parts[0].eq_ignore_ascii_case("subscriptions") {
            return Err(invalid("missing subscriptions segment"));
        }
        if !parts[2].eq_ignore_ascii_case("resourceGroups") {
            return Err(invalid("missing resourceGroups segment"));
        }
        if !parts[4].eq_ignore_ascii_case("providers") {
            return Err(invalid("missing providers segment"));
        }
        let rest = &parts[6..];
        if rest.len() % 2 != 0 {
            return Err(invalid("resource type without a name"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty path segment"));
        }

        Ok(Self {
            subscription_id: parts[1].to_string(),
            resource_group: parts[3].to_string(),
            provider: parts[5].to_string(),
            segments: rest
                .chunks(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect(),
        })
    }

    /// Name of the innermost resource.
    pub fn name(&self) -> &str {
        self.segments.last().map(|(_, n)| n.as_str()).unwrap_or_default()
    }

    /// Full type, e.g. `Microsoft.Network/virtualNetworks/subnets`.
    pub fn resource_type(&self) -> String {
        let mut ty = self.provider.clone();
        for (segment, _) in &self.segments {
            ty.push('/');
            ty.push_str(segment);
        }
        ty
    }

    fn expect_type(self, id: &str, expected: &str) -> Result<Self> {
        if self.resource_type().eq_ignore_ascii_case(expected) {
            Ok(self)
        } else {
            Err(InfraError::InvalidResourceId {
                id: id.to_string(),
                reason: format!("expected a {} resource", expected),
            })
        }
    }
}

impl FromStr for ResourceId {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// `(name, resource group)` of an existing network security group id.
pub fn parse_security_group_id(id: &str) -> Result<(String, String)> {
    let parsed =
        ResourceId::parse(id)?.expect_type(id, "Microsoft.Network/networkSecurityGroups")?;
    Ok((parsed.name().to_string(), parsed.resource_group))
}

/// `(name, resource group)` of an existing virtual network id.
pub fn parse_virtual_network_id(id: &str) -> Result<(String, String)> {
    let parsed = ResourceId::parse(id)?.expect_type(id, "Microsoft.Network/virtualNetworks")?;
    Ok((parsed.name().to_string(), parsed.resource_group))
}

/// Subnet name of an existing subnet id.
pub fn parse_subnet_id(id: &str) -> Result<String> {
    let parsed =
        ResourceId::parse(id)?.expect_type(id, "Microsoft.Network/virtualNetworks/subnets")?;
    Ok(parsed.name().to_string())
}

/// Resource group of any resource id (used for the public DNS zone).
pub fn resource_group_of(id: &str) -> Result<String> {
    Ok(ResourceId::parse(id)?.resource_group)
}
